//! Pull-based snapshot collection on the printer (rank 0).
//!
//! The printer renders its own rows, then prompts every other rank in
//! ascending order with a one-byte message and waits for that rank's whole
//! block before prompting the next. Output order is therefore global row
//! order, and the printer never holds more than one block from elsewhere.

use std::io::{self, Write};

use tracing::debug;

use crate::error::Result;
use crate::grid::{encode, Grid};
use crate::loader::Geometry;
use crate::partition::BlockRange;
use crate::transport::{Tag, Transport};

/// Destination for snapshot rows on the printer.
pub trait Renderer {
    /// Called once per global row, top to bottom.
    fn row(&mut self, cells: &[u8]) -> io::Result<()>;

    /// Called after the last row of a snapshot.
    fn end_frame(&mut self) -> io::Result<()>;
}

/// Writes `'0'`/`'1'` lines followed by a blank line per snapshot.
pub struct StreamRenderer<W: Write> {
    out: W,
    line: Vec<u8>,
}

impl<W: Write> StreamRenderer<W> {
    pub fn new(out: W) -> Self {
        StreamRenderer {
            out,
            line: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for StreamRenderer<W> {
    fn row(&mut self, cells: &[u8]) -> io::Result<()> {
        self.line.clear();
        self.line.extend(cells.iter().map(|&cell| encode(cell)));
        self.line.push(b'\n');
        self.out.write_all(&self.line)
    }

    fn end_frame(&mut self) -> io::Result<()> {
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

fn render_block<R>(renderer: &mut R, cells: &[u8], width: usize) -> io::Result<()>
where
    R: Renderer + ?Sized,
{
    if width == 0 {
        return Ok(());
    }
    for row in cells.chunks(width) {
        renderer.row(row)?;
    }
    Ok(())
}

/// Collects the current generation on the printer and renders it there.
///
/// Every rank must call this at the same point of the run. `renderer` is
/// only used on the printer; other ranks may pass `None`.
pub fn gather<T, R>(
    comm: &T,
    geometry: Geometry,
    grid: &Grid,
    renderer: Option<&mut R>,
) -> Result<()>
where
    T: Transport,
    R: Renderer + ?Sized,
{
    let topology = comm.topology();
    let printer = topology.printer();
    let mut block = Vec::new();
    grid.copy_interior(&mut block);

    if topology.is_printer() {
        let mut sink = renderer;
        if let Some(r) = sink.as_deref_mut() {
            render_block(r, &block, geometry.width)?;
        }
        block.reserve(BlockRange::max_size(topology.size, geometry.height) * geometry.width);
        for rank in 1..topology.size {
            let rows = BlockRange::of(rank, topology.size, geometry.height).size;
            block.clear();
            block.resize(rows * geometry.width, 0);
            comm.send(rank, Tag::Prompt, &[0])?;
            comm.receive_into(rank, Tag::Print, &mut block)?;
            debug!(rank, rows, "block gathered");
            if let Some(r) = sink.as_deref_mut() {
                render_block(r, &block, geometry.width)?;
            }
        }
        if let Some(r) = sink.as_deref_mut() {
            r.end_frame()?;
        }
    } else {
        let mut prompt = [0u8; 1];
        comm.receive_into(printer, Tag::Prompt, &mut prompt)?;
        comm.send(printer, Tag::Print, &block)?;
    }
    Ok(())
}
