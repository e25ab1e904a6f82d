use std::{
    fs,
    io::{self, BufRead, BufReader, Read},
    ops::{Index, IndexMut},
    path::Path,
};

use xz2::read::XzDecoder;

use crate::cache::Word;

/// Number of words in main memory.
pub const NUM_MEMORY: usize = 65536;

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("error in reading address {line}: {text:?} is not a word")]
    Parse { line: usize, text: String },
    #[error("program has {len} words, memory holds 65536")]
    TooLarge { len: usize },
}

/// Flat, word addressed main memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    words: Vec<Word>,
    program_len: usize,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            words: vec![0; NUM_MEMORY],
            program_len: 0,
        }
    }

    pub fn with_program(program: &[Word]) -> Result<Self, MemoryError> {
        if program.len() > NUM_MEMORY {
            return Err(MemoryError::TooLarge { len: program.len() });
        }
        let mut mem = Memory::new();
        mem.words[..program.len()].copy_from_slice(program);
        mem.program_len = program.len();
        Ok(mem)
    }

    /// Load a machine code file, one decimal word per line.
    ///
    /// Files ending in `.xz` are decompressed on the fly.
    pub fn read(path: &Path) -> Result<Self, MemoryError> {
        let file = fs::File::open(path)?;
        if path.extension().is_some_and(|ext| ext == "xz") {
            Memory::parse(XzDecoder::new(file))
        } else {
            Memory::parse(file)
        }
    }

    pub fn parse(reader: impl Read) -> Result<Self, MemoryError> {
        let mut program = Vec::new();
        for (line, text) in BufReader::new(reader).lines().enumerate() {
            let text = text?;
            let word = leading_word(&text).ok_or_else(|| MemoryError::Parse {
                line,
                text: text.clone(),
            })?;
            program.push(word);
        }
        Memory::with_program(&program)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Number of words loaded from the program file.
    pub fn program_len(&self) -> usize {
        self.program_len
    }

    pub fn block(&self, base: usize, size: usize) -> &[Word] {
        &self.words[base..base + size]
    }

    pub fn write_block(&mut self, base: usize, data: &[Word]) {
        self.words[base..base + data.len()].copy_from_slice(data);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl Index<usize> for Memory {
    type Output = Word;

    fn index(&self, addr: usize) -> &Word {
        &self.words[addr]
    }
}

impl IndexMut<usize> for Memory {
    fn index_mut(&mut self, addr: usize) -> &mut Word {
        &mut self.words[addr]
    }
}

/// Parse the first whitespace separated token of a line, trailing text such as
/// an assembler comment is ignored.
fn leading_word(line: &str) -> Option<Word> {
    line.split_whitespace().next()?.parse().ok()
}
