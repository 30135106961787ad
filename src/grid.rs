//! Padded per-process grid storage.
//!
//! A block of `rows x width` cells is stored with one halo row above and
//! below and one sentinel column on each side, so every interior cell has
//! eight readable neighbours. Row-major, stride `width + 2`.

pub const DEAD: u8 = 0;
pub const ALIVE: u8 = 1;

/// Maps a source-file character to a cell value.
pub fn decode(marker: u8) -> u8 {
    match marker {
        b' ' | b'0' | b'.' => DEAD,
        _ => ALIVE,
    }
}

/// Character written for a cell in a rendered snapshot.
pub fn encode(cell: u8) -> u8 {
    if cell == DEAD {
        b'0'
    } else {
        b'1'
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    width: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// All-dead grid with `rows` interior rows of `width` cells.
    pub fn new(rows: usize, width: usize) -> Self {
        Grid {
            rows,
            width,
            cells: vec![DEAD; (rows + 2) * (width + 2)],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn stride(&self) -> usize {
        self.width + 2
    }

    /// Offset of padded coordinate `(r, c)`, where row 0 / `rows + 1` are
    /// halos and column 0 / `width + 1` are sentinels.
    fn index(&self, r: usize, c: usize) -> usize {
        assert!(
            r < self.rows + 2 && c < self.width + 2,
            "cell ({}, {}) outside padded {}x{} grid",
            r,
            c,
            self.rows + 2,
            self.width + 2
        );
        r * self.stride() + c
    }

    /// Value at padded coordinate `(r, c)`.
    pub fn get(&self, r: usize, c: usize) -> u8 {
        self.cells[self.index(r, c)]
    }

    /// Sets an interior cell. Interior coordinates are 1-based so that they
    /// line up with `get`; halos and sentinels are not writable here.
    pub fn set(&mut self, r: usize, c: usize, value: u8) {
        assert!(
            (1..=self.rows).contains(&r) && (1..=self.width).contains(&c),
            "cell ({}, {}) is not an interior cell",
            r,
            c
        );
        let i = self.index(r, c);
        self.cells[i] = value;
    }

    /// The `width` cells of padded row `r`, without sentinel columns.
    pub fn row(&self, r: usize) -> &[u8] {
        let start = self.index(r, 1);
        &self.cells[start..start + self.width]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [u8] {
        let start = self.index(r, 1);
        let width = self.width;
        &mut self.cells[start..start + width]
    }

    /// First interior row.
    pub fn top_row(&self) -> &[u8] {
        self.row(1)
    }

    /// Last interior row.
    pub fn bottom_row(&self) -> &[u8] {
        self.row(self.rows)
    }

    pub fn top_halo_mut(&mut self) -> &mut [u8] {
        self.row_mut(0)
    }

    pub fn bottom_halo_mut(&mut self) -> &mut [u8] {
        let r = self.rows + 1;
        self.row_mut(r)
    }

    /// Decodes `rows x width` source characters into the interior.
    pub fn fill_from_markers(&mut self, raw: &[u8]) {
        assert_eq!(raw.len(), self.rows * self.width, "block size mismatch");
        if self.width == 0 {
            return;
        }
        for (r, chunk) in raw.chunks(self.width).enumerate() {
            for (dst, &marker) in self.row_mut(r + 1).iter_mut().zip(chunk) {
                *dst = decode(marker);
            }
        }
    }

    /// Copies the interior into `out` as contiguous row-major cells.
    pub fn copy_interior(&self, out: &mut Vec<u8>) {
        out.clear();
        for r in 1..=self.rows {
            out.extend_from_slice(self.row(r));
        }
    }

    /// True if every sentinel column cell is dead.
    pub fn sentinels_clear(&self) -> bool {
        (0..self.rows + 2).all(|r| self.get(r, 0) == DEAD && self.get(r, self.width + 1) == DEAD)
    }
}

/// The two generation buffers of one process.
#[derive(Debug, Clone)]
pub struct LocalGrid {
    current: Grid,
    next: Grid,
}

impl LocalGrid {
    pub fn new(current: Grid) -> Self {
        let next = Grid::new(current.rows(), current.width());
        LocalGrid { current, next }
    }

    pub fn current(&self) -> &Grid {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Grid {
        &mut self.current
    }

    /// Read-only current generation alongside the writable next one.
    pub fn split(&mut self) -> (&Grid, &mut Grid) {
        (&self.current, &mut self.next)
    }

    /// Makes the freshly computed generation current.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_decode_like_the_source_format() {
        for dead in [b' ', b'0', b'.'] {
            assert_eq!(decode(dead), DEAD);
        }
        for alive in [b'1', b'*', b'#', b'x'] {
            assert_eq!(decode(alive), ALIVE);
        }
        assert_eq!(encode(DEAD), b'0');
        assert_eq!(encode(ALIVE), b'1');
    }

    #[test]
    fn new_grid_is_dead_including_padding() {
        let grid = Grid::new(3, 4);
        for r in 0..5 {
            for c in 0..6 {
                assert_eq!(grid.get(r, c), DEAD);
            }
        }
        assert!(grid.sentinels_clear());
    }

    #[test]
    fn fill_places_cells_inside_the_padding() {
        let mut grid = Grid::new(2, 3);
        grid.fill_from_markers(b"1.0 #*");
        assert_eq!(grid.row(1), &[ALIVE, DEAD, DEAD]);
        assert_eq!(grid.row(2), &[DEAD, ALIVE, ALIVE]);
        assert_eq!(grid.row(0), &[DEAD; 3]);
        assert_eq!(grid.row(3), &[DEAD; 3]);
        assert!(grid.sentinels_clear());

        let mut out = Vec::new();
        grid.copy_interior(&mut out);
        assert_eq!(out, vec![1, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn halo_rows_do_not_touch_sentinels() {
        let mut grid = Grid::new(1, 2);
        grid.top_halo_mut().copy_from_slice(&[ALIVE, ALIVE]);
        grid.bottom_halo_mut().copy_from_slice(&[ALIVE, ALIVE]);
        assert!(grid.sentinels_clear());
        assert_eq!(grid.get(0, 1), ALIVE);
        assert_eq!(grid.get(2, 2), ALIVE);
    }

    #[test]
    #[should_panic]
    fn sentinel_is_not_writable() {
        let mut grid = Grid::new(2, 2);
        grid.set(1, 0, ALIVE);
    }

    #[test]
    #[should_panic]
    fn out_of_range_read_is_caught() {
        let grid = Grid::new(2, 2);
        grid.get(4, 0);
    }

    #[test]
    fn swap_exchanges_buffers_without_copying_contents() {
        let mut grid = Grid::new(1, 1);
        grid.set(1, 1, ALIVE);
        let mut local = LocalGrid::new(grid);
        {
            let (current, next) = local.split();
            assert_eq!(current.get(1, 1), ALIVE);
            assert_eq!(next.get(1, 1), DEAD);
        }
        local.swap();
        assert_eq!(local.current().get(1, 1), DEAD);
        local.swap();
        assert_eq!(local.current().get(1, 1), ALIVE);
    }
}
