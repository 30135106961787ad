/// A contiguous run of global grid rows owned by one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: usize,
    pub size: usize,
}

impl BlockRange {
    /// Rows `[floor(id*n/p), floor((id+1)*n/p))` of an `n`-row grid split over `p` processes.
    ///
    /// The caller guarantees `p >= 1`, `id < p` and `p <= n`.
    pub fn of(id: usize, p: usize, n: usize) -> Self {
        let start = block_low(id, p, n);
        let size = block_low(id + 1, p, n) - start;
        BlockRange { start, size }
    }

    pub fn end(&self) -> usize {
        self.start + self.size
    }

    /// Largest block any of the `p` processes owns.
    pub fn max_size(p: usize, n: usize) -> usize {
        (n + p - 1) / p
    }
}

fn block_low(id: usize, p: usize, n: usize) -> usize {
    // u128 keeps id * n from overflowing on huge grids.
    (id as u128 * n as u128 / p as u128) as usize
}
