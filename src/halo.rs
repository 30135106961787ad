//! Ghost-row exchange between row neighbours.
//!
//! Every exchange is one row of `width` cells. Ordering is keyed on rank
//! parity and must not be rearranged: odd ranks send first on both legs
//! (below, then above) and even ranks receive first on both legs (above,
//! then below). On every boundary one side is sending while the other is
//! receiving, so the chain completes even when sends block until matched.
//! A missing neighbour skips its leg and leaves that halo row dead.

use crate::error::Result;
use crate::grid::Grid;
use crate::transport::{Tag, Transport};

/// Fills both halo rows of `grid` with the neighbours' current boundary rows.
pub fn exchange<T: Transport>(comm: &T, grid: &mut Grid) -> Result<()> {
    let topology = comm.topology();
    if topology.rank % 2 == 1 {
        if let Some(below) = topology.below() {
            comm.send(below, Tag::SendBelow, grid.bottom_row())?;
            comm.receive_into(below, Tag::SendAbove, grid.bottom_halo_mut())?;
        }
        if let Some(above) = topology.above() {
            comm.send(above, Tag::SendAbove, grid.top_row())?;
            comm.receive_into(above, Tag::SendBelow, grid.top_halo_mut())?;
        }
    } else {
        if let Some(above) = topology.above() {
            comm.receive_into(above, Tag::SendBelow, grid.top_halo_mut())?;
            comm.send(above, Tag::SendAbove, grid.top_row())?;
        }
        if let Some(below) = topology.below() {
            comm.receive_into(below, Tag::SendAbove, grid.bottom_halo_mut())?;
            comm.send(below, Tag::SendBelow, grid.bottom_row())?;
        }
    }
    Ok(())
}
