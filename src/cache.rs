use std::{
    io::{self, Write},
    ops::{Not, Range},
};

use serde::Serialize;

use crate::{
    config::Geometry,
    memory::Memory,
    replace::Replace,
    trace::{Action, TraceSink, Transfer},
};

/// Most blocks a cache may hold across all of its sets.
pub const MAX_CACHE_SIZE: usize = 256;
/// Most words a single block may hold.
pub const MAX_BLOCK_SIZE: usize = 256;

pub type Word = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub offset: usize,
    pub set: usize,
    pub tag: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BitSection {
    shift: usize,
    mask: usize,
}

impl BitSection {
    fn apply(&self, num: usize) -> usize {
        (num >> self.shift) & self.mask
    }

    fn place(&self, field: usize) -> usize {
        (field & self.mask) << self.shift
    }
}

/// Splits word addresses into tag, set index and block offset.
#[derive(Debug, Clone)]
pub struct AddrDecoder {
    offset_sec: BitSection,
    set_sec: BitSection,
    tag_sec: BitSection,
}

impl AddrDecoder {
    pub fn new(geometry: &Geometry) -> Self {
        let offset_sec = BitSection {
            shift: 0,
            mask: geometry.block_size() - 1,
        };
        let set_shift = geometry.offset_bits();
        let set_sec = BitSection {
            shift: set_shift,
            mask: geometry.n_sets() - 1,
        };
        let tag_sec = BitSection {
            shift: set_shift + geometry.set_bits(),
            mask: 0usize.not(),
        };
        AddrDecoder {
            offset_sec,
            set_sec,
            tag_sec,
        }
    }

    pub fn split(&self, addr: usize) -> Addr {
        Addr {
            offset: self.block_offset(addr),
            set: self.set_index(addr),
            tag: self.tag(addr),
        }
    }

    pub fn set_index(&self, addr: usize) -> usize {
        self.set_sec.apply(addr)
    }

    pub fn tag(&self, addr: usize) -> usize {
        self.tag_sec.apply(addr)
    }

    pub fn block_offset(&self, addr: usize) -> usize {
        self.offset_sec.apply(addr)
    }

    /// First word address of the block identified by `tag` in `set`.
    pub fn block_base(&self, tag: usize, set: usize) -> usize {
        self.tag_sec.place(tag) + self.set_sec.place(set)
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub valid: bool,
    pub dirty: bool,
    pub tag: usize,
    pub set: usize,
    pub data: Vec<Word>,
}

impl Block {
    fn new(block_size: usize) -> Self {
        Block {
            valid: false,
            dirty: false,
            tag: 0,
            set: 0,
            data: vec![0; block_size],
        }
    }

    pub fn apply(&mut self, addr: &Addr) {
        self.valid = true;
        self.tag = addr.tag;
        self.set = addr.set;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    name: String,
    instructions: u64,
    loads: u64,
    stores: u64,
    hits: u64,
    misses: u64,
    writebacks: u64,
    discards: u64,
    miss_rate: f64,
}

/// The processor's view of a cache: word loads and stores backed by `mem`.
pub trait IsCache {
    fn load(&mut self, mem: &mut Memory, addr: usize) -> Word;
    fn store(&mut self, mem: &mut Memory, addr: usize, value: Word);
    fn make_stats(&self, instructions: u64) -> CacheStats;
}

/// Set associative, write back cache.
///
/// Every transfer between processor, cache and memory is reported to the
/// trace sink `T` in the order it happens: on a miss the eviction of the
/// victim precedes the fill, which precedes the word access.
#[derive(Debug)]
pub struct Cache<R: Replace, T: TraceSink> {
    name: String,
    geometry: Geometry,
    decoder: AddrDecoder,
    pub blocks: Vec<Block>,
    pub set_data: Vec<R>,
    pub trace: T,
    loads: u64,
    stores: u64,
    hits: u64,
    misses: u64,
    writebacks: u64,
    discards: u64,
}

impl<R: Replace, T: TraceSink> Cache<R, T> {
    pub fn new(name: String, geometry: Geometry, trace: T) -> Self {
        Cache {
            name,
            decoder: AddrDecoder::new(&geometry),
            blocks: (0..geometry.n_blocks())
                .map(|_| Block::new(geometry.block_size()))
                .collect(),
            set_data: (0..geometry.n_sets())
                .map(|_| R::new(geometry.n_ways()))
                .collect(),
            geometry,
            trace,
            loads: 0,
            stores: 0,
            hits: 0,
            misses: 0,
            writebacks: 0,
            discards: 0,
        }
    }

    pub fn get_set(&self, set: usize) -> Range<usize> {
        set * self.geometry.n_ways()..(set + 1) * self.geometry.n_ways()
    }

    /// Make the block holding `addr` resident and mark it most recently used.
    ///
    /// Returns the block's slot in `blocks` and the word offset of `addr`
    /// inside it.
    pub fn access(&mut self, mem: &mut Memory, addr: usize) -> (usize, usize) {
        let split = self.decoder.split(addr);
        let set_range = self.get_set(split.set);
        let hit = self.blocks[set_range.clone()]
            .iter()
            .position(|b| b.valid && b.tag == split.tag);

        let way = match hit {
            Some(way) => {
                log::trace!("hit {addr} in set {} way {way}", split.set);
                self.hits += 1;
                way
            }
            None => {
                let way = self.set_data[split.set].victim();
                log::trace!("miss {addr} in set {}, replacing way {way}", split.set);
                self.misses += 1;
                let slot = set_range.start + way;
                self.evict(mem, slot);
                self.fill(mem, slot, addr, &split);
                way
            }
        };
        self.set_data[split.set].touch(way);
        (set_range.start + way, split.offset)
    }

    fn evict(&mut self, mem: &mut Memory, slot: usize) {
        let block_size = self.geometry.block_size();
        let victim = &mut self.blocks[slot];
        if !victim.valid {
            return;
        }
        let base = self.decoder.block_base(victim.tag, victim.set);
        if victim.dirty {
            mem.write_block(base, &victim.data);
            victim.dirty = false;
            self.writebacks += 1;
            self.trace
                .record(Transfer::new(base, block_size, Action::CacheToMemory));
        } else {
            self.discards += 1;
            self.trace
                .record(Transfer::new(base, block_size, Action::CacheToNowhere));
        }
    }

    fn fill(&mut self, mem: &Memory, slot: usize, addr: usize, split: &Addr) {
        let block_size = self.geometry.block_size();
        let base = addr - addr % block_size;
        let block = &mut self.blocks[slot];
        block.data.copy_from_slice(mem.block(base, block_size));
        block.apply(split);
        self.trace
            .record(Transfer::new(base, block_size, Action::MemoryToCache));
    }

    pub fn dump(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "cache {}:", self.name)?;
        for set in 0..self.geometry.n_sets() {
            writeln!(out, "  set {set}:")?;
            for (way, slot) in self.get_set(set).enumerate() {
                let block = &self.blocks[slot];
                if !block.valid {
                    writeln!(out, "    [ {way} ]: invalid")?;
                    continue;
                }
                writeln!(
                    out,
                    "    [ {way} ]: tag {} lru {}{} data {:?}",
                    block.tag,
                    self.set_data[set].rank(way),
                    if block.dirty { " dirty" } else { "" },
                    block.data
                )?;
            }
        }
        Ok(())
    }
}

impl<R: Replace, T: TraceSink> IsCache for Cache<R, T> {
    fn load(&mut self, mem: &mut Memory, addr: usize) -> Word {
        let (slot, offset) = self.access(mem, addr);
        self.loads += 1;
        self.trace
            .record(Transfer::new(addr, 1, Action::CacheToProcessor));
        self.blocks[slot].data[offset]
    }

    fn store(&mut self, mem: &mut Memory, addr: usize, value: Word) {
        let (slot, offset) = self.access(mem, addr);
        self.stores += 1;
        self.trace
            .record(Transfer::new(addr, 1, Action::ProcessorToCache));
        let block = &mut self.blocks[slot];
        block.data[offset] = value;
        block.dirty = true;
    }

    fn make_stats(&self, instructions: u64) -> CacheStats {
        let accesses = self.hits + self.misses;
        let miss_rate = if accesses == 0 {
            0.0
        } else {
            self.misses as f64 / accesses as f64
        };
        CacheStats {
            name: self.name.clone(),
            instructions,
            loads: self.loads,
            stores: self.stores,
            hits: self.hits,
            misses: self.misses,
            writebacks: self.writebacks,
            discards: self.discards,
            miss_rate,
        }
    }
}
