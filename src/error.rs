use std::fmt;
use std::io;

use thiserror::Error;

use crate::transport::Tag;

/// Why every process stopped before simulating.
///
/// Load failures travel in the `width` slot of the geometry broadcast
/// whenever `height` is the `0` abort sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Unreadable,
    Malformed,
    TooManyProcesses { processes: usize },
    Unwritable,
}

impl AbortReason {
    pub fn code(&self) -> u64 {
        match self {
            AbortReason::Unreadable => 0,
            AbortReason::Malformed => 1,
            AbortReason::TooManyProcesses { .. } => 2,
            AbortReason::Unwritable => 3,
        }
    }

    /// Inverse of `code`; `None` for a code no reason maps to.
    pub fn from_code(code: u64, processes: usize) -> Option<Self> {
        match code {
            0 => Some(AbortReason::Unreadable),
            1 => Some(AbortReason::Malformed),
            2 => Some(AbortReason::TooManyProcesses { processes }),
            3 => Some(AbortReason::Unwritable),
            _ => None,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Unreadable => write!(f, "Error reading file"),
            AbortReason::Malformed => write!(f, "Error reading file: malformed grid header"),
            AbortReason::TooManyProcesses { processes } => {
                write!(f, "Grid has fewer rows than the {} processes", processes)
            }
            AbortReason::Unwritable => write!(f, "Could not open the output file for writing"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed grid header: {0}")]
    Header(String),

    #[error("{0}")]
    Aborted(AbortReason),

    #[error("rank {from} sent {actual} bytes with tag {tag:?}, expected {expected}")]
    Protocol {
        from: usize,
        tag: Tag,
        expected: usize,
        actual: usize,
    },

    #[error("rank {peer} is no longer reachable")]
    Disconnected { peer: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reason_survives_the_sentinel_broadcast() {
        for reason in [
            AbortReason::Unreadable,
            AbortReason::Malformed,
            AbortReason::TooManyProcesses { processes: 9 },
            AbortReason::Unwritable,
        ] {
            assert_eq!(AbortReason::from_code(reason.code(), 9), Some(reason));
        }
    }

    #[test]
    fn unknown_abort_code_is_not_guessed() {
        assert_eq!(AbortReason::from_code(4, 2), None);
        assert_eq!(AbortReason::from_code(u64::MAX, 2), None);
    }

    #[test]
    fn aborted_prints_one_line() {
        let msg = Error::Aborted(AbortReason::TooManyProcesses { processes: 4 }).to_string();
        assert_eq!(msg, "Grid has fewer rows than the 4 processes");
        assert!(!msg.contains('\n'));
    }
}
