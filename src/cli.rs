use std::path::PathBuf;

use clap::Parser;

use crate::driver::SimulationConfig;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Conway's Game of Life over row blocks spread across cooperating processes"
)]
pub struct Cli {
    /// Grid file: a `height width` line, then one line of cells per row
    pub source: PathBuf,

    /// Number of generations to compute
    pub duration: u64,

    /// Generations between snapshots; without it only the first and last are printed
    pub period: Option<u64>,

    // Output settings
    /// Write snapshots here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Append the elapsed seconds of the run to this file
    #[arg(long)]
    pub timing: Option<PathBuf>,

    /// Ranks to run as threads when not launched under MPI
    #[arg(long, default_value = "1")]
    pub ranks: usize,

    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn validate_parameters(&self) -> Result<(), String> {
        if self.period == Some(0) {
            return Err("Snapshot period must be at least 1".to_string());
        }
        if self.ranks == 0 {
            return Err("Number of ranks must be positive".to_string());
        }
        Ok(())
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            duration: self.duration,
            period: self.period,
        }
    }
}
