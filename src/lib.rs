//! Conway's Game of Life on a grid split into contiguous row blocks, one
//! block per process. Processes exchange only their boundary rows each
//! generation and the full grid is only ever assembled row block by row
//! block on the printer.

pub mod cli;
pub mod driver;
pub mod error;
pub mod gather;
pub mod grid;
pub mod halo;
pub mod kernel;
pub mod loader;
pub mod logging;
pub mod partition;
pub mod transport;

pub use driver::{run, RunReport, Simulation, SimulationConfig};
pub use error::{AbortReason, Error, Result};
pub use gather::{Renderer, StreamRenderer};
pub use grid::{Grid, LocalGrid};
pub use loader::Geometry;
pub use partition::BlockRange;
pub use transport::{LocalTransport, LocalUniverse, Tag, Topology, Transport};
#[cfg(feature = "mpi")]
pub use transport::MpiTransport;
