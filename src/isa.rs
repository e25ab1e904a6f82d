use crate::cache::Word;

const OPCODE_SHIFT: u32 = 22;
const REG_A_SHIFT: u32 = 19;
const REG_B_SHIFT: u32 = 16;
const REG_MASK: Word = 0b111;
const OFFSET_MASK: Word = 0xFFFF;

/// A decoded machine word. Register fields index the 8 general registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Add { a: usize, b: usize, dest: usize },
    Nor { a: usize, b: usize, dest: usize },
    Lw { a: usize, b: usize, offset: Word },
    Sw { a: usize, b: usize, offset: Word },
    Beq { a: usize, b: usize, offset: Word },
    Jalr { a: usize, b: usize },
    Halt,
    Noop,
}

pub fn opcode(word: Word) -> Word {
    word >> OPCODE_SHIFT
}

fn field(word: Word, shift: u32) -> usize {
    ((word >> shift) & REG_MASK) as usize
}

/// Sign extend the low 16 bits.
fn offset(word: Word) -> Word {
    (word & OFFSET_MASK) as i16 as Word
}

impl Instr {
    /// Returns `None` when the opcode is outside `0..=7`.
    pub fn decode(word: Word) -> Option<Instr> {
        let a = field(word, REG_A_SHIFT);
        let b = field(word, REG_B_SHIFT);
        let instr = match opcode(word) {
            0 => Instr::Add {
                a,
                b,
                dest: field(word, 0),
            },
            1 => Instr::Nor {
                a,
                b,
                dest: field(word, 0),
            },
            2 => Instr::Lw {
                a,
                b,
                offset: offset(word),
            },
            3 => Instr::Sw {
                a,
                b,
                offset: offset(word),
            },
            4 => Instr::Beq {
                a,
                b,
                offset: offset(word),
            },
            5 => Instr::Jalr { a, b },
            6 => Instr::Halt,
            7 => Instr::Noop,
            _ => return None,
        };
        Some(instr)
    }
}

#[cfg(test)]
impl Instr {
    pub fn encode(self) -> Word {
        let regs = |op: Word, a: usize, b: usize| {
            op << OPCODE_SHIFT | (a as Word) << REG_A_SHIFT | (b as Word) << REG_B_SHIFT
        };
        match self {
            Instr::Add { a, b, dest } => regs(0, a, b) | dest as Word,
            Instr::Nor { a, b, dest } => regs(1, a, b) | dest as Word,
            Instr::Lw { a, b, offset } => regs(2, a, b) | (offset & OFFSET_MASK),
            Instr::Sw { a, b, offset } => regs(3, a, b) | (offset & OFFSET_MASK),
            Instr::Beq { a, b, offset } => regs(4, a, b) | (offset & OFFSET_MASK),
            Instr::Jalr { a, b } => regs(5, a, b),
            Instr::Halt => 6 << OPCODE_SHIFT,
            Instr::Noop => 7 << OPCODE_SHIFT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{opcode, Instr};

    #[test]
    fn test_decode_known_words() {
        // lw 0 1 five, with five at address 7
        assert_eq!(
            Instr::decode(8454151),
            Some(Instr::Lw {
                a: 0,
                b: 1,
                offset: 7
            })
        );
        // add 1 2 1
        assert_eq!(
            Instr::decode(655361),
            Some(Instr::Add {
                a: 1,
                b: 2,
                dest: 1
            })
        );
        // beq 0 0 -3
        assert_eq!(
            Instr::decode(16842749),
            Some(Instr::Beq {
                a: 0,
                b: 0,
                offset: -3
            })
        );
        assert_eq!(Instr::decode(25165824), Some(Instr::Halt));
        assert_eq!(Instr::decode(29360128), Some(Instr::Noop));
    }

    #[test]
    fn test_illegal_opcodes() {
        assert_eq!(opcode(-1), -1);
        assert_eq!(Instr::decode(-1), None);
        assert_eq!(Instr::decode(8 << 22), None);
    }

    #[test]
    fn test_encode_matches_decode() {
        for instr in [
            Instr::Nor {
                a: 7,
                b: 6,
                dest: 5,
            },
            Instr::Sw {
                a: 3,
                b: 4,
                offset: -32768,
            },
            Instr::Beq {
                a: 1,
                b: 2,
                offset: 32767,
            },
            Instr::Jalr { a: 4, b: 7 },
        ] {
            assert_eq!(Instr::decode(instr.encode()), Some(instr));
        }
    }
}
