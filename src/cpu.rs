use crate::{
    cache::{IsCache, Word},
    isa::{self, Instr},
    memory::Memory,
};

pub const NUM_REGS: usize = 8;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CpuError {
    #[error("address {addr} accessed at pc {pc} is outside of memory")]
    AddressOutOfRange { pc: Word, addr: Word },
    #[error("illegal opcode {opcode} at pc {pc}")]
    IllegalOpcode { pc: Word, opcode: Word },
    #[error("no halt after {limit} instructions")]
    InstructionLimit { limit: u64 },
}

/// Processor state of the toy machine. All memory traffic, instruction
/// fetches included, goes through the cache.
#[derive(Debug)]
pub struct Cpu {
    pub pc: Word,
    pub reg: [Word; NUM_REGS],
    pub instr_idx: u64,
    pub halted: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            pc: 0,
            reg: [0; NUM_REGS],
            instr_idx: 0,
            halted: false,
        }
    }

    fn check_addr(&self, mem: &Memory, addr: Word) -> Result<usize, CpuError> {
        usize::try_from(addr)
            .ok()
            .filter(|&addr| addr < mem.len())
            .ok_or(CpuError::AddressOutOfRange { pc: self.pc, addr })
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self, cache: &mut impl IsCache, mem: &mut Memory) -> Result<(), CpuError> {
        let pc = self.check_addr(mem, self.pc)?;
        let word = cache.load(mem, pc);
        let instr = Instr::decode(word).ok_or(CpuError::IllegalOpcode {
            pc: self.pc,
            opcode: isa::opcode(word),
        })?;
        log::debug!("{:>5}: {:?}", self.pc, instr);
        self.instr_idx += 1;

        let next = self.pc.wrapping_add(1);
        self.pc = match instr {
            Instr::Add { a, b, dest } => {
                self.reg[dest] = self.reg[a].wrapping_add(self.reg[b]);
                next
            }
            Instr::Nor { a, b, dest } => {
                self.reg[dest] = !(self.reg[a] | self.reg[b]);
                next
            }
            Instr::Lw { a, b, offset } => {
                let addr = self.check_addr(mem, self.reg[a].wrapping_add(offset))?;
                self.reg[b] = cache.load(mem, addr);
                next
            }
            Instr::Sw { a, b, offset } => {
                let addr = self.check_addr(mem, self.reg[a].wrapping_add(offset))?;
                cache.store(mem, addr, self.reg[b]);
                next
            }
            Instr::Beq { a, b, offset } if self.reg[a] == self.reg[b] => next.wrapping_add(offset),
            Instr::Beq { .. } => next,
            Instr::Jalr { a, b } => {
                // the link is written before the target is read
                self.reg[b] = next;
                self.reg[a]
            }
            Instr::Halt => {
                self.halted = true;
                next
            }
            Instr::Noop => next,
        };
        Ok(())
    }

    /// Run until halt. A `limit` of 0 runs without an instruction limit.
    pub fn run(
        &mut self,
        cache: &mut impl IsCache,
        mem: &mut Memory,
        limit: u64,
    ) -> Result<u64, CpuError> {
        while !self.halted {
            if limit != 0 && self.instr_idx >= limit {
                return Err(CpuError::InstructionLimit { limit });
            }
            self.step(cache, mem)?;
        }
        log::info!("machine halted after {} instructions", self.instr_idx);
        Ok(self.instr_idx)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Cpu, CpuError};
    use crate::{
        cache::{Cache, IsCache, Word},
        config::Config,
        isa::Instr,
        memory::{Memory, NUM_MEMORY},
        replace::lru::Lru,
        trace::{Action, Recorder, Transfer},
    };
    use pretty_assertions_sorted as diff;

    fn new_cache(block_size: usize, sets: usize, ways: usize) -> Cache<Lru, Recorder> {
        let geometry = Config {
            block_size,
            sets,
            ways,
        }
        .validate()
        .unwrap();
        Cache::new("test".to_string(), geometry, Recorder::new())
    }

    fn assemble(program: &[Instr], data: &[Word]) -> Memory {
        let words: Vec<Word> = program
            .iter()
            .map(|instr| instr.encode())
            .chain(data.iter().copied())
            .collect();
        Memory::with_program(&words).unwrap()
    }

    /// Counts reg1 down from 5 to 0 and stores reg2 (-1) at address 10.
    fn countdown() -> Memory {
        assemble(
            &[
                Instr::Lw {
                    a: 0,
                    b: 1,
                    offset: 8,
                },
                Instr::Lw {
                    a: 0,
                    b: 2,
                    offset: 9,
                },
                Instr::Add {
                    a: 1,
                    b: 2,
                    dest: 1,
                },
                Instr::Beq {
                    a: 0,
                    b: 1,
                    offset: 1,
                },
                Instr::Beq {
                    a: 0,
                    b: 0,
                    offset: -3,
                },
                Instr::Sw {
                    a: 0,
                    b: 2,
                    offset: 10,
                },
                Instr::Halt,
                Instr::Noop,
            ],
            &[5, -1, 0],
        )
    }

    #[test]
    fn test_countdown_program() {
        let mut mem = countdown();
        let mut cache = new_cache(4, 2, 2);
        let mut cpu = Cpu::new();
        assert_eq!(cpu.run(&mut cache, &mut mem, 0), Ok(18));
        assert!(cpu.halted);
        assert_eq!(cpu.pc, 7);
        assert_eq!(cpu.reg[1], 0);
        assert_eq!(cpu.reg[2], -1);

        diff::assert_eq!(
            cache.trace.transfers[..4].to_vec(),
            vec![
                Transfer::new(0, 4, Action::MemoryToCache),
                Transfer::new(0, 1, Action::CacheToProcessor),
                Transfer::new(8, 4, Action::MemoryToCache),
                Transfer::new(8, 1, Action::CacheToProcessor),
            ]
        );
        let stores: Vec<_> = cache
            .trace
            .transfers
            .iter()
            .filter(|t| t.action == Action::ProcessorToCache)
            .collect();
        assert_eq!(stores, vec![&Transfer::new(10, 1, Action::ProcessorToCache)]);

        // the store is still only in the cache
        assert_eq!(mem[10], 0);
        assert_eq!(cache.load(&mut mem, 10), -1);
    }

    #[test]
    fn test_fetches_go_through_cache() {
        let mut mem = assemble(&[Instr::Noop, Instr::Noop, Instr::Halt], &[]);
        let mut cache = new_cache(1, 1, 1);
        let mut cpu = Cpu::new();
        assert_eq!(cpu.run(&mut cache, &mut mem, 0), Ok(3));
        let fetched: Vec<_> = cache
            .trace
            .transfers
            .iter()
            .filter(|t| t.action == Action::CacheToProcessor)
            .map(|t| t.addr)
            .collect();
        assert_eq!(fetched, vec![0, 1, 2]);
    }

    #[test]
    fn test_nor_and_jalr() {
        let mut mem = assemble(
            &[
                Instr::Nor {
                    a: 0,
                    b: 0,
                    dest: 3,
                },
                Instr::Lw {
                    a: 0,
                    b: 4,
                    offset: 5,
                },
                Instr::Jalr { a: 4, b: 5 },
                Instr::Halt,
                Instr::Halt,
            ],
            &[4],
        );
        let mut cache = new_cache(2, 2, 1);
        let mut cpu = Cpu::new();
        assert_eq!(cpu.run(&mut cache, &mut mem, 0), Ok(4));
        assert_eq!(cpu.reg[3], -1);
        assert_eq!(cpu.reg[5], 3);
        assert_eq!(cpu.pc, 5);
    }

    #[test]
    fn test_jalr_same_register() {
        let mut mem = assemble(&[Instr::Jalr { a: 1, b: 1 }, Instr::Halt], &[]);
        let mut cache = new_cache(1, 2, 1);
        let mut cpu = Cpu::new();
        cpu.step(&mut cache, &mut mem).unwrap();
        assert_eq!(cpu.pc, 1);
        assert_eq!(cpu.reg[1], 1);

        // falls through to the halt
        assert_eq!(cpu.run(&mut cache, &mut mem, 0), Ok(2));
        assert_eq!(cpu.pc, 2);
    }

    #[test]
    fn test_illegal_opcode() {
        let mut mem = Memory::with_program(&[Instr::Noop.encode(), -1]).unwrap();
        let mut cache = new_cache(1, 1, 1);
        let mut cpu = Cpu::new();
        assert_eq!(
            cpu.run(&mut cache, &mut mem, 0),
            Err(CpuError::IllegalOpcode { pc: 1, opcode: -1 })
        );
    }

    #[test]
    fn test_address_out_of_range() {
        let mut mem = assemble(
            &[Instr::Lw {
                a: 0,
                b: 1,
                offset: -1,
            }],
            &[],
        );
        let mut cache = new_cache(1, 1, 1);
        let mut cpu = Cpu::new();
        assert_eq!(
            cpu.run(&mut cache, &mut mem, 0),
            Err(CpuError::AddressOutOfRange { pc: 0, addr: -1 })
        );

        let mut cpu = Cpu::new();
        cpu.pc = NUM_MEMORY as Word;
        assert!(matches!(
            cpu.step(&mut cache, &mut mem),
            Err(CpuError::AddressOutOfRange { .. })
        ));
    }

    #[test]
    fn test_instruction_limit() {
        let mut mem = assemble(
            &[Instr::Beq {
                a: 0,
                b: 0,
                offset: -1,
            }],
            &[],
        );
        let mut cache = new_cache(1, 1, 1);
        let mut cpu = Cpu::new();
        assert_eq!(
            cpu.run(&mut cache, &mut mem, 100),
            Err(CpuError::InstructionLimit { limit: 100 })
        );
        assert_eq!(cpu.instr_idx, 100);
    }
}
