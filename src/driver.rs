//! Orchestrates one run: load, then `duration` rounds of exchange, compute
//! and swap, with snapshots gathered on the printer along the way.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, info_span, warn};

use crate::error::{AbortReason, Error, Result};
use crate::gather::{gather, Renderer, StreamRenderer};
use crate::grid::{Grid, LocalGrid};
use crate::halo;
use crate::kernel;
use crate::loader::{self, Geometry, LoadedBlock};
use crate::partition::BlockRange;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Number of generations to compute.
    pub duration: u64,
    /// Generations between snapshots. Without one, only the initial and
    /// final states are rendered.
    pub period: Option<u64>,
}

impl SimulationConfig {
    /// Whether a snapshot is taken before computing generation `turn + 1`.
    pub fn snapshot_due(&self, turn: u64) -> bool {
        match self.period {
            Some(period) => turn % period == 0,
            None => turn == 0,
        }
    }
}

/// Where one process is in its run: `Init`, `Load`, then `Exchange`,
/// `Compute` and `Swap` once per generation, then `FinalGather` and `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Load,
    Exchange,
    Compute,
    Swap,
    FinalGather,
    Shutdown,
}

impl Phase {
    /// Whether a process in `self` may move straight to `next`.
    pub fn precedes(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Init, Phase::Load)
                | (Phase::Load, Phase::Exchange)
                | (Phase::Load, Phase::FinalGather)
                | (Phase::Exchange, Phase::Compute)
                | (Phase::Compute, Phase::Swap)
                | (Phase::Swap, Phase::Exchange)
                | (Phase::Swap, Phase::FinalGather)
                | (Phase::FinalGather, Phase::Shutdown)
        )
    }
}

/// What one process knows at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub geometry: Geometry,
    pub block: BlockRange,
    pub generations: u64,
    pub snapshots: u64,
    /// Wall time from the first generation to the final barrier, printer only.
    pub elapsed: Option<f64>,
}

impl RunReport {
    /// Appends the elapsed seconds as one line to `path`.
    pub fn append_timing(&self, path: &Path) -> io::Result<()> {
        if let Some(elapsed) = self.elapsed {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", elapsed)?;
            file.flush()?;
        }
        Ok(())
    }
}

/// The loaded state of one process between generations.
pub struct Simulation<'a, T: Transport> {
    comm: &'a T,
    config: SimulationConfig,
    geometry: Geometry,
    block: BlockRange,
    grid: LocalGrid,
    phase: Phase,
    turn: u64,
    snapshots: u64,
}

impl<'a, T: Transport> Simulation<'a, T> {
    /// Runs the distributed load. Returns `Error::Aborted` on every process
    /// when the reader rejected the source.
    pub fn load<R, F>(comm: &'a T, config: SimulationConfig, open: F) -> Result<Self>
    where
        R: BufRead,
        F: FnOnce() -> io::Result<R>,
    {
        debug!(from = ?Phase::Init, to = ?Phase::Load, "phase");
        let LoadedBlock {
            geometry,
            block,
            grid,
        } = loader::load(comm, open)?;
        Ok(Simulation {
            comm,
            config,
            geometry,
            block,
            grid,
            phase: Phase::Load,
            turn: 0,
            snapshots: 0,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// This process's current generation.
    pub fn grid(&self) -> &Grid {
        self.grid.current()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase.precedes(next),
            "{:?} cannot follow {:?}",
            next,
            self.phase
        );
        debug!(turn = self.turn, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    /// Generations computed so far.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Computes one generation.
    pub fn step(&mut self) -> Result<()> {
        self.enter(Phase::Exchange);
        halo::exchange(self.comm, self.grid.current_mut())?;

        self.enter(Phase::Compute);
        let (current, next) = self.grid.split();
        kernel::step(current, next);

        self.enter(Phase::Swap);
        self.grid.swap();
        self.turn += 1;
        Ok(())
    }

    /// Gathers and renders the current generation; collective.
    pub fn snapshot<Rd>(&mut self, renderer: Option<&mut Rd>) -> Result<()>
    where
        Rd: Renderer + ?Sized,
    {
        gather(self.comm, self.geometry, self.grid.current(), renderer)?;
        self.snapshots += 1;
        Ok(())
    }

    /// Runs every remaining generation, the final snapshot and the timing barrier.
    pub fn run<Rd>(mut self, mut renderer: Option<&mut Rd>) -> Result<RunReport>
    where
        Rd: Renderer + ?Sized,
    {
        let topology = self.comm.topology();
        self.comm.barrier()?;
        let start = self.comm.wall_time();

        while self.turn < self.config.duration {
            if self.config.snapshot_due(self.turn) {
                self.snapshot(renderer.as_deref_mut())?;
            }
            self.step()?;
        }

        self.enter(Phase::FinalGather);
        self.snapshot(renderer.as_deref_mut())?;

        self.enter(Phase::Shutdown);
        self.comm.barrier()?;
        let elapsed = if topology.is_printer() {
            Some(self.comm.wall_time() - start)
        } else {
            None
        };

        let report = RunReport {
            geometry: self.geometry,
            block: self.block,
            generations: self.turn,
            snapshots: self.snapshots,
            elapsed,
        };
        if let Some(seconds) = report.elapsed {
            info!(
                processes = topology.size,
                height = report.geometry.height,
                width = report.geometry.width,
                generations = report.generations,
                seconds,
                "simulation finished"
            );
        }
        Ok(report)
    }
}

/// Opens the snapshot destination on the printer: `path`, or stdout.
///
/// The printer reports success or failure to every process before anyone
/// goes further, so a destination that cannot be created stops the whole
/// run instead of leaving ranks waiting on a gather.
pub fn open_renderer<T: Transport>(
    comm: &T,
    path: Option<&Path>,
) -> Result<Option<Box<dyn Renderer>>> {
    let topology = comm.topology();
    let mut renderer: Option<Box<dyn Renderer>> = None;
    let mut status = [1u64];
    if topology.is_printer() {
        match path {
            Some(path) => match File::create(path) {
                Ok(file) => renderer = Some(Box::new(StreamRenderer::new(BufWriter::new(file)))),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "cannot create output file");
                    status[0] = 0;
                }
            },
            None => renderer = Some(Box::new(StreamRenderer::new(BufWriter::new(io::stdout())))),
        }
    }
    comm.broadcast(topology.printer(), &mut status)?;
    if status[0] == 0 {
        return Err(Error::Aborted(AbortReason::Unwritable));
    }
    Ok(renderer)
}

/// Loads the source opened by `open` and runs the whole simulation.
pub fn run<T, R, F, Rd>(
    comm: &T,
    config: SimulationConfig,
    open: F,
    renderer: Option<&mut Rd>,
) -> Result<RunReport>
where
    T: Transport,
    R: BufRead,
    F: FnOnce() -> io::Result<R>,
    Rd: Renderer + ?Sized,
{
    let topology = comm.topology();
    let span = info_span!("rank", rank = topology.rank);
    let _enter = span.enter();
    debug!(phase = ?Phase::Init, processes = topology.size, ?config);
    Simulation::load(comm, config, open)?.run(renderer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalUniverse;
    use std::io::Cursor;

    const BLINKER: &str = "3 3\n...\n111\n...\n";

    fn run_local(
        source: &'static str,
        p: usize,
        config: SimulationConfig,
    ) -> Vec<Result<(RunReport, String)>> {
        LocalUniverse::run(p, |comm| {
            let mut out = StreamRenderer::new(Vec::new());
            let report = run(
                &comm,
                config,
                || Ok(Cursor::new(source.as_bytes())),
                Some(&mut out),
            )?;
            let text = String::from_utf8(out.into_inner()).unwrap_or_default();
            Ok((report, text))
        })
    }

    #[test]
    fn snapshot_schedule() {
        let periodic = SimulationConfig {
            duration: 10,
            period: Some(4),
        };
        let due: Vec<u64> = (0..10).filter(|&t| periodic.snapshot_due(t)).collect();
        assert_eq!(due, vec![0, 4, 8]);

        let ends_only = SimulationConfig {
            duration: 10,
            period: None,
        };
        let due: Vec<u64> = (0..10).filter(|&t| ends_only.snapshot_due(t)).collect();
        assert_eq!(due, vec![0]);
    }

    #[test]
    fn phases_follow_the_run_order() {
        let order = [
            Phase::Init,
            Phase::Load,
            Phase::Exchange,
            Phase::Compute,
            Phase::Swap,
            Phase::Exchange,
        ];
        assert!(order.windows(2).all(|w| w[0].precedes(w[1])));
        assert!(Phase::Load.precedes(Phase::FinalGather));
        assert!(Phase::Swap.precedes(Phase::FinalGather));
        assert!(Phase::FinalGather.precedes(Phase::Shutdown));
        assert!(!Phase::Exchange.precedes(Phase::Swap));
        assert!(!Phase::Compute.precedes(Phase::FinalGather));
        assert!(!Phase::Shutdown.precedes(Phase::Load));
    }

    #[test]
    fn simulation_tracks_its_phase() {
        let config = SimulationConfig {
            duration: 2,
            period: None,
        };
        let results = LocalUniverse::run(2, |comm| {
            let mut sim =
                Simulation::load(&comm, config, || Ok(Cursor::new(BLINKER.as_bytes())))?;
            let mut seen = vec![sim.phase()];
            sim.step()?;
            seen.push(sim.phase());
            Ok::<_, Error>(seen)
        });
        for result in results {
            assert_eq!(result.unwrap(), vec![Phase::Load, Phase::Swap]);
        }
    }

    #[test]
    fn zero_duration_renders_the_loaded_grid_once() {
        let config = SimulationConfig {
            duration: 0,
            period: Some(1),
        };
        let results = run_local("3 3\n.#.\n#.#\n. 1\n", 2, config);
        let (report, text) = results[0].as_ref().unwrap();
        assert_eq!(text, "010\n101\n001\n\n");
        assert_eq!(report.snapshots, 1);
        assert_eq!(report.generations, 0);
    }

    #[test]
    fn blinker_renders_every_generation() {
        let config = SimulationConfig {
            duration: 2,
            period: Some(1),
        };
        let results = run_local(BLINKER, 3, config);
        let (report, text) = results[0].as_ref().unwrap();
        assert_eq!(text, "000\n111\n000\n\n010\n010\n010\n\n000\n111\n000\n\n");
        assert_eq!(report.snapshots, 3);
        assert!(report.elapsed.is_some());
        for other in &results[1..] {
            let (report, text) = other.as_ref().unwrap();
            assert!(text.is_empty());
            assert_eq!(report.snapshots, 3);
            assert!(report.elapsed.is_none());
        }
    }

    #[test]
    fn missing_period_renders_first_and_last_only() {
        let config = SimulationConfig {
            duration: 3,
            period: None,
        };
        let results = run_local(BLINKER, 1, config);
        let (report, text) = results[0].as_ref().unwrap();
        assert_eq!(text, "000\n111\n000\n\n010\n010\n010\n\n");
        assert_eq!(report.generations, 3);
        assert_eq!(report.snapshots, 2);
    }

    #[test]
    fn abort_reaches_every_rank_before_any_generation() {
        let config = SimulationConfig {
            duration: 5,
            period: Some(1),
        };
        let results = run_local(BLINKER, 4, config);
        for result in results {
            match result {
                Err(Error::Aborted(AbortReason::TooManyProcesses { processes: 4 })) => {}
                other => panic!("expected abort, got {:?}", other.map(|(r, _)| r)),
            }
        }
    }

    struct BrokenPipe;

    impl Renderer for BrokenPipe {
        fn row(&mut self, _cells: &[u8]) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn end_frame(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn renderer_failure_on_the_printer_ends_every_rank() {
        let config = SimulationConfig {
            duration: 2,
            period: Some(1),
        };
        let results = LocalUniverse::run(3, |comm| {
            let mut sink = BrokenPipe;
            run(
                &comm,
                config,
                || Ok(Cursor::new(BLINKER.as_bytes())),
                Some(&mut sink),
            )
        });
        assert!(matches!(&results[0], Err(Error::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe));
        for result in &results[1..] {
            assert!(matches!(result, Err(Error::Disconnected { peer: 0 })));
        }
    }

    #[test]
    fn unwritable_output_stops_every_rank() {
        let path = std::env::temp_dir()
            .join("life_rows_no_such_dir")
            .join("out.txt");
        let results = LocalUniverse::run(3, |comm| {
            open_renderer(&comm, Some(&path)).map(|r| r.is_some())
        });
        for result in results {
            assert!(matches!(result, Err(Error::Aborted(AbortReason::Unwritable))));
        }
    }

    #[test]
    fn only_the_printer_gets_a_renderer() {
        let path = std::env::temp_dir().join(format!("life_rows_out_{}", std::process::id()));
        let results = LocalUniverse::run(3, |comm| {
            open_renderer(&comm, Some(&path)).map(|r| r.is_some())
        });
        let _ = std::fs::remove_file(&path);
        let flags: Vec<bool> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(flags, vec![true, false, false]);
    }

    #[test]
    fn timing_is_appended_one_line_per_run() {
        let path = std::env::temp_dir().join(format!("life_rows_timing_{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let report = RunReport {
            geometry: Geometry {
                height: 1,
                width: 1,
            },
            block: BlockRange { start: 0, size: 1 },
            generations: 0,
            snapshots: 1,
            elapsed: Some(0.5),
        };
        report.append_timing(&path).unwrap();
        report.append_timing(&path).unwrap();
        RunReport {
            elapsed: None,
            ..report.clone()
        }
        .append_timing(&path)
        .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(written, "0.5\n0.5\n");
    }
}
