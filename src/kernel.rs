use crate::grid::{Grid, ALIVE, DEAD};

/// B3/S23: born with three neighbours, survives with two or three.
pub fn next_state(cell: u8, neighbors: u32) -> u8 {
    if neighbors == 3 || (neighbors == 2 && cell == ALIVE) {
        ALIVE
    } else {
        DEAD
    }
}

fn live_neighbors(grid: &Grid, r: usize, c: usize) -> u32 {
    let mut sum = 0;
    for nr in r - 1..=r + 1 {
        for nc in c - 1..=c + 1 {
            if (nr, nc) != (r, c) {
                sum += grid.get(nr, nc) as u32;
            }
        }
    }
    sum
}

/// Writes the next generation of every interior cell of `current` into `next`.
///
/// Reads halo rows and sentinel columns of `current` as neighbours but never
/// writes them in `next`.
pub fn step(current: &Grid, next: &mut Grid) {
    debug_assert_eq!(current.rows(), next.rows());
    debug_assert_eq!(current.width(), next.width());
    for r in 1..=current.rows() {
        for c in 1..=current.width() {
            let neighbors = live_neighbors(current, r, c);
            next.set(r, c, next_state(current.get(r, c), neighbors));
        }
    }
}
