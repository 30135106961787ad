//! Reading the source grid on one process and handing each process its rows.
//!
//! The reader (highest rank) parses the `height width` header and broadcasts
//! it. A broadcast `height` of `0` tells every process to stop; the `width`
//! slot then carries the `AbortReason`. After the broadcast the reader walks
//! ranks `0..reader` in order, sending each its block as raw source
//! characters, and keeps the remaining rows for itself.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{AbortReason, Error, Result};
use crate::grid::{Grid, LocalGrid};
use crate::partition::BlockRange;
use crate::transport::{Tag, Transport};

/// Global grid dimensions, identical on every process after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub height: usize,
    pub width: usize,
}

/// One process's share of the grid, ready to simulate.
#[derive(Debug)]
pub struct LoadedBlock {
    pub geometry: Geometry,
    pub block: BlockRange,
    pub grid: LocalGrid,
}

/// Parses the `height width` first line of a grid source.
pub fn parse_header(line: &str) -> Result<Geometry> {
    let mut fields = line.split_whitespace();
    let mut next = |name: &str| -> Result<usize> {
        let field = fields
            .next()
            .ok_or_else(|| Error::Header(format!("missing {}", name)))?;
        field
            .parse::<usize>()
            .map_err(|_| Error::Header(format!("{} {:?} is not a row count", name, field)))
    };
    let height = next("height")?;
    let width = next("width")?;
    if height == 0 || width == 0 {
        return Err(Error::Header(format!("empty {}x{} grid", height, width)));
    }
    // Every rank allocates a padded buffer from these values.
    let padded = height
        .checked_add(2)
        .zip(width.checked_add(2))
        .and_then(|(rows, cols)| rows.checked_mul(cols))
        .filter(|&cells| cells <= isize::MAX as usize);
    if padded.is_none() {
        return Err(Error::Header(format!("{}x{} grid is too large", height, width)));
    }
    Ok(Geometry { height, width })
}

fn open_source<R, F>(open: F, processes: usize) -> std::result::Result<(Geometry, R), AbortReason>
where
    R: BufRead,
    F: FnOnce() -> io::Result<R>,
{
    let mut source = open().map_err(|e| {
        warn!(error = %e, "grid source could not be opened");
        AbortReason::Unreadable
    })?;
    let mut line = String::new();
    source.read_line(&mut line).map_err(|e| {
        warn!(error = %e, "grid header could not be read");
        AbortReason::Unreadable
    })?;
    let geometry = parse_header(&line).map_err(|e| {
        warn!(error = %e, "rejecting grid source");
        AbortReason::Malformed
    })?;
    if processes > geometry.height {
        return Err(AbortReason::TooManyProcesses { processes });
    }
    Ok((geometry, source))
}

/// Reads `rows` lines of `width` markers into `raw`.
///
/// Missing characters, missing lines and read failures become dead cells;
/// the geometry is already shared with every process by the time rows are
/// read, so the reader has to keep the transfer going.
fn read_rows<R: BufRead>(source: &mut R, rows: usize, width: usize, raw: &mut Vec<u8>) {
    raw.clear();
    let mut line = Vec::with_capacity(width + 2);
    for _ in 0..rows {
        line.clear();
        if let Err(e) = source.read_until(b'\n', &mut line) {
            warn!(error = %e, "grid source read failed, padding with dead cells");
            line.clear();
        }
        while matches!(line.last().copied(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.len() < width {
            warn!(found = line.len(), width, "short grid row, padding with dead cells");
            line.resize(width, b'0');
        }
        raw.extend_from_slice(&line[..width]);
    }
}

/// Loads this process's block, opening the source with `open` on the reader only.
pub fn load<T, R, F>(comm: &T, open: F) -> Result<LoadedBlock>
where
    T: Transport,
    R: BufRead,
    F: FnOnce() -> io::Result<R>,
{
    let topology = comm.topology();
    let reader = topology.reader();

    let mut words = [0u64; 2];
    let mut source = None;
    if topology.is_reader() {
        match open_source(open, topology.size) {
            Ok((geometry, src)) => {
                words = [geometry.height as u64, geometry.width as u64];
                source = Some(src);
            }
            Err(reason) => words = [0, reason.code()],
        }
    }

    comm.broadcast(reader, &mut words)?;
    comm.barrier()?;
    if words[0] == 0 {
        let reason = AbortReason::from_code(words[1], topology.size).unwrap_or_else(|| {
            warn!(code = words[1], "reader aborted with an unknown reason");
            AbortReason::Unreadable
        });
        return Err(Error::Aborted(reason));
    }

    let geometry = Geometry {
        height: words[0] as usize,
        width: words[1] as usize,
    };
    let block = BlockRange::of(topology.rank, topology.size, geometry.height);
    let mut grid = Grid::new(block.size, geometry.width);

    let mut raw =
        Vec::with_capacity(BlockRange::max_size(topology.size, geometry.height) * geometry.width);
    match source {
        Some(mut src) => {
            for dest in 0..reader {
                let rows = BlockRange::of(dest, topology.size, geometry.height).size;
                read_rows(&mut src, rows, geometry.width, &mut raw);
                debug!(dest, rows, "sending initial block");
                comm.send(dest, Tag::InitialRead, &raw)?;
            }
            read_rows(&mut src, block.size, geometry.width, &mut raw);
        }
        None => {
            raw.resize(block.size * geometry.width, 0);
            comm.receive_into(reader, Tag::InitialRead, &mut raw)?;
        }
    }
    grid.fill_from_markers(&raw);

    debug!(
        rank = topology.rank,
        start = block.start,
        rows = block.size,
        width = geometry.width,
        "block loaded"
    );
    Ok(LoadedBlock {
        geometry,
        block,
        grid: LocalGrid::new(grid),
    })
}

/// Loads from a grid file on disk.
pub fn load_path<T: Transport>(comm: &T, path: &Path) -> Result<LoadedBlock> {
    load(comm, || File::open(path).map(BufReader::new))
}
