use serde::Deserialize;

use crate::cache::{MAX_BLOCK_SIZE, MAX_CACHE_SIZE};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block size must be a power of two in 1..=256 words, got {0}")]
    BlockSize(usize),
    #[error("number of sets must be a power of two, got {0}")]
    Sets(usize),
    #[error("blocks per set must be at least 1, got {0}")]
    Ways(usize),
    #[error("{sets} sets x {ways} ways exceeds the cache capacity of 256 blocks")]
    Capacity { sets: usize, ways: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub block_size: usize,
    pub sets: usize,
    pub ways: usize,
}

/// Cache shape that passed [`Config::validate`].
///
/// Block size and set count are guaranteed powers of two, so the address
/// fields derived from them are exact bit ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_size: usize,
    n_sets: usize,
    n_ways: usize,
}

impl Geometry {
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn n_sets(&self) -> usize {
        self.n_sets
    }

    pub fn n_ways(&self) -> usize {
        self.n_ways
    }

    pub fn n_blocks(&self) -> usize {
        self.n_sets * self.n_ways
    }

    pub fn offset_bits(&self) -> usize {
        self.block_size.ilog2() as usize
    }

    pub fn set_bits(&self) -> usize {
        self.n_sets.ilog2() as usize
    }
}

impl Config {
    pub fn validate(&self) -> Result<Geometry, ConfigError> {
        if !self.block_size.is_power_of_two() || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if !self.sets.is_power_of_two() {
            return Err(ConfigError::Sets(self.sets));
        }
        if self.ways == 0 {
            return Err(ConfigError::Ways(self.ways));
        }
        match self.sets.checked_mul(self.ways) {
            Some(n_blocks) if n_blocks <= MAX_CACHE_SIZE => {}
            _ => {
                return Err(ConfigError::Capacity {
                    sets: self.sets,
                    ways: self.ways,
                })
            }
        }
        Ok(Geometry {
            block_size: self.block_size,
            n_sets: self.sets,
            n_ways: self.ways,
        })
    }
}
