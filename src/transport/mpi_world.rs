use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::{Tag, Topology, Transport};
use crate::error::{Error, Result};

/// Transport over the MPI world communicator.
///
/// The caller keeps the `mpi::environment::Universe` alive for as long as
/// this value is in use.
pub struct MpiTransport {
    world: SimpleCommunicator,
    topology: Topology,
}

impl MpiTransport {
    pub fn new(world: SimpleCommunicator) -> Self {
        let topology = Topology::new(world.rank() as usize, world.size() as usize);
        MpiTransport { world, topology }
    }

    /// Terminates every process of the run.
    pub fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}

impl Transport for MpiTransport {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn send(&self, dest: usize, tag: Tag, data: &[u8]) -> Result<()> {
        self.world
            .process_at_rank(dest as i32)
            .send_with_tag(data, tag.code());
        Ok(())
    }

    fn receive_into(&self, source: usize, tag: Tag, buf: &mut [u8]) -> Result<()> {
        let status = self
            .world
            .process_at_rank(source as i32)
            .receive_into_with_tag(buf, tag.code());
        let actual = status.count(u8::equivalent_datatype()) as usize;
        if actual != buf.len() {
            return Err(Error::Protocol {
                from: source,
                tag,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    fn broadcast(&self, root: usize, values: &mut [u64]) -> Result<()> {
        self.world
            .process_at_rank(root as i32)
            .broadcast_into(values);
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn wall_time(&self) -> f64 {
        mpi::time()
    }
}
