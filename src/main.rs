extern crate failure;
extern crate pingsweep;
#[macro_use]
extern crate slog;
extern crate slog_term;

use std::process;
use std::sync::Mutex;

use slog::{Drain, Logger};

use pingsweep::addrgen::AddressGenerator;
use pingsweep::exclude::ExclusionSet;
use pingsweep::pump::{Config, Pump};
use pingsweep::store::SqliteStore;

/// Exclusion list, one CIDR block per line, in the working directory.
const EXCLUDE_PATH: &str = "exclude.txt";
/// Collected status documents end up here.
const DATABASE_PATH: &str = "servers.db";

fn main() {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = Mutex::new(slog_term::FullFormat::new(decorator).build()).fuse();
    let log = Logger::root(drain, o!());

    if let Err(e) = run(&log) {
        crit!(log, "fatal error"; "error" => %e);
        process::exit(1);
    }
}

fn run(log: &Logger) -> Result<(), failure::Error> {
    let excluded = ExclusionSet::load(EXCLUDE_PATH)?;
    info!(log, "loaded exclusion list"; "path" => EXCLUDE_PATH, "entries" => excluded.len());

    let store = SqliteStore::open(DATABASE_PATH)?;
    let config = Config::default();
    info!(log, "starting sweep";
          "target_connections" => config.target_connections,
          "port" => config.scan_port);

    let targets = AddressGenerator::new(&excluded);
    let mut pump = Pump::new(log.clone(), config, targets, store)?;
    pump.run()?;
    Ok(())
}
