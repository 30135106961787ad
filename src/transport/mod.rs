//! Blocking message passing between the processes of one run.
//!
//! Implementations: `LocalTransport` (threads inside one process) and, with
//! the `mpi` feature, `MpiTransport` over the MPI world communicator.

mod local;
#[cfg(feature = "mpi")]
mod mpi_world;

pub use self::local::{LocalTransport, LocalUniverse};
#[cfg(feature = "mpi")]
pub use self::mpi_world::MpiTransport;

use crate::error::Result;

/// Message tags. A receive only matches a message with the same source and tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    InitialRead,
    SendBelow,
    SendAbove,
    Prompt,
    Print,
    Geometry,
}

impl Tag {
    pub fn code(self) -> i32 {
        match self {
            Tag::InitialRead => 0,
            Tag::SendBelow => 1,
            Tag::SendAbove => 2,
            Tag::Prompt => 3,
            Tag::Print => 4,
            Tag::Geometry => 5,
        }
    }
}

/// Where this process sits in the chain of ranks `0..size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub rank: usize,
    pub size: usize,
}

impl Topology {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {} out of range for {} processes", rank, size);
        Topology { rank, size }
    }

    /// The process that reads the grid source and hands out blocks.
    pub fn reader(&self) -> usize {
        self.size - 1
    }

    pub fn is_reader(&self) -> bool {
        self.rank == self.reader()
    }

    /// The process that collects and renders snapshots.
    pub fn printer(&self) -> usize {
        0
    }

    pub fn is_printer(&self) -> bool {
        self.rank == self.printer()
    }

    /// Neighbour owning the rows directly above ours.
    pub fn above(&self) -> Option<usize> {
        self.rank.checked_sub(1)
    }

    /// Neighbour owning the rows directly below ours.
    pub fn below(&self) -> Option<usize> {
        if self.rank + 1 < self.size {
            Some(self.rank + 1)
        } else {
            None
        }
    }
}

/// Blocking point-to-point and collective primitives.
///
/// `send` returns once the transport has accepted the message. `receive_into`
/// suspends until a message from `source` with `tag` arrives and fails with
/// `Error::Protocol` unless it carries exactly `buf.len()` bytes.
pub trait Transport {
    fn topology(&self) -> Topology;

    fn send(&self, dest: usize, tag: Tag, data: &[u8]) -> Result<()>;

    fn receive_into(&self, source: usize, tag: Tag, buf: &mut [u8]) -> Result<()>;

    /// Copies `root`'s `values` into every other process's `values`.
    fn broadcast(&self, root: usize, values: &mut [u64]) -> Result<()>;

    /// Returns once every process has entered the barrier.
    fn barrier(&self) -> Result<()>;

    /// Seconds since an arbitrary fixed point, comparable across calls on one process.
    fn wall_time(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_has_no_wraparound() {
        let top = Topology::new(0, 3);
        assert_eq!(top.above(), None);
        assert_eq!(top.below(), Some(1));
        assert!(top.is_printer());
        assert!(!top.is_reader());

        let bottom = Topology::new(2, 3);
        assert_eq!(bottom.above(), Some(1));
        assert_eq!(bottom.below(), None);
        assert!(bottom.is_reader());
    }

    #[test]
    fn single_process_is_both_reader_and_printer() {
        let only = Topology::new(0, 1);
        assert!(only.is_reader());
        assert!(only.is_printer());
        assert_eq!(only.above(), None);
        assert_eq!(only.below(), None);
    }
}
