use super::Replace;

/// Rank based LRU.
///
/// Every way carries a rank in `0..n_ways`, 0 being the most recently used and
/// `n_ways - 1` the least. The ranks of a set always form a permutation.
#[derive(Debug, Clone)]
pub struct Lru {
    ranks: Vec<usize>,
}

impl Replace for Lru {
    fn new(n_ways: usize) -> Self {
        // way 0 starts as the LRU way so misses fill the set in way order
        Lru {
            ranks: (0..n_ways).rev().collect(),
        }
    }

    fn touch(&mut self, way: usize) {
        let prev = self.ranks[way];
        for rank in self.ranks.iter_mut().filter(|rank| **rank < prev) {
            *rank += 1;
        }
        self.ranks[way] = 0;
    }

    fn victim(&self) -> usize {
        let lru = self.ranks.len() - 1;
        self.ranks
            .iter()
            .position(|&rank| rank == lru)
            .expect("lru ranks are not a permutation")
    }

    fn rank(&self, way: usize) -> usize {
        self.ranks[way]
    }
}
