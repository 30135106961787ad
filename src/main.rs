use std::fs::File;
use std::io::BufReader;
use std::process;

use clap::Parser;
use tracing::error;

use life_rows::cli::Cli;
use life_rows::driver::{self, open_renderer};
use life_rows::{logging, Error, Transport};

/// Parses the command line, printing problems only when `report` is set so
/// that a multi-process launch shows them once.
fn parse_cli(report: bool) -> Option<Cli> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if report {
                let _ = e.print();
            }
            return None;
        }
    };
    if let Err(msg) = cli.validate_parameters() {
        if report {
            eprintln!("Error: {}", msg);
        }
        return None;
    }
    Some(cli)
}

fn execute<T: Transport>(comm: &T, cli: &Cli) -> Result<(), Error> {
    let mut renderer = open_renderer(comm, cli.output.as_deref())?;
    let source = cli.source.as_path();
    let report = driver::run(
        comm,
        cli.simulation_config(),
        || File::open(source).map(BufReader::new),
        renderer.as_deref_mut(),
    )?;
    if let Some(path) = &cli.timing {
        report.append_timing(path)?;
    }
    Ok(())
}

/// Exit status for a finished rank. Configuration problems are reported by
/// the printer alone and still exit cleanly.
fn finish(result: Result<(), Error>, printer: bool) -> i32 {
    match result {
        Ok(()) => 0,
        Err(Error::Aborted(reason)) => {
            if printer {
                eprintln!("{}", reason);
            }
            0
        }
        Err(e) => {
            error!(error = %e, "run failed");
            if printer {
                eprintln!("Error: {}", e);
            }
            1
        }
    }
}

#[cfg(feature = "mpi")]
fn main() {
    use life_rows::MpiTransport;

    let universe = match mpi::initialize() {
        Some(universe) => universe,
        None => {
            eprintln!("ERROR: MPI could not be initialized");
            process::exit(1);
        }
    };
    let comm = MpiTransport::new(universe.world());
    let printer = comm.topology().is_printer();

    let cli = match parse_cli(printer) {
        Some(cli) => cli,
        None => return,
    };
    logging::init(cli.verbose);
    if cli.ranks != 1 && printer {
        tracing::warn!(ranks = cli.ranks, "--ranks is ignored under MPI");
    }

    let code = finish(execute(&comm, &cli), printer);
    if code != 0 {
        // Peers may be blocked in a receive that will never complete.
        comm.abort(code);
    }
    drop(comm);
    drop(universe);
    process::exit(code);
}

#[cfg(not(feature = "mpi"))]
fn main() {
    use life_rows::LocalUniverse;

    let cli = match parse_cli(true) {
        Some(cli) => cli,
        None => return,
    };
    logging::init(cli.verbose);

    let results = LocalUniverse::run(cli.ranks, |comm| {
        let printer = comm.topology().is_printer();
        (execute(&comm, &cli), printer)
    });
    let code = results
        .into_iter()
        .map(|(result, printer)| finish(result, printer))
        .max()
        .unwrap_or(0);
    process::exit(code);
}
