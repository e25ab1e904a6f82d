pub mod lru;

/// Per-set replacement state, one instance for every set of a cache.
pub trait Replace {
    fn new(n_ways: usize) -> Self;

    /// Record an access to `way`.
    fn touch(&mut self, way: usize);

    /// The way to reuse on the next miss in this set.
    fn victim(&self) -> usize;

    /// Recency of `way`, 0 is most recently used.
    fn rank(&self, way: usize) -> usize;
}
