use std::env;
use std::process;

use log::{error, info};
use simple_logger::SimpleLogger;

use tw_rust::tw_event_sinks::ConsoleEventSink;
use tw_rust::{Algorithm, Scheduler, SimConfig, SimError, TopologyConfig, TopologyKind};

fn usage() -> ! {
    eprintln!("Usage: tree-wave <wave|election> <node_count> [true]");
    eprintln!("  pass `true` as third argument for the full log");
    process::exit(2);
}

fn main() {
    SimpleLogger::new().init().unwrap();

    let args: Vec<String> = env::args().collect();
    let algorithm = match args.get(1).map(String::as_str) {
        Some("wave") => Algorithm::Wave,
        Some("election") => Algorithm::Election,
        _ => usage(),
    };
    let n: usize = match args.get(2).map(|s| s.parse()) {
        Some(Ok(n)) => n,
        _ => usage(),
    };
    let verbose = args.get(3).map(|s| s == "true").unwrap_or(false);

    info!("starting");

    for kind in [
        TopologyKind::Arbitrary,
        TopologyKind::BinaryUnbalanced,
        TopologyKind::BinaryBalanced,
    ] {
        if let Err(e) = emulate(algorithm, kind, n, verbose) {
            error!("{:?} on {:?} failed: {}", algorithm, kind, e);
            process::exit(1);
        }
    }
}

fn emulate(algorithm: Algorithm, kind: TopologyKind, n: usize, verbose: bool) -> Result<(), SimError> {
    let config = SimConfig {
        algorithm,
        topology: TopologyConfig {
            kind,
            node_count: n,
            ..Default::default()
        },
        verbose_log: verbose,
        ..Default::default()
    };

    let mut scheduler = Scheduler::new_with_sink(config, Box::new(ConsoleEventSink::new(true)))?;
    println!("{}", scheduler.topology());

    let result = scheduler.run()?;
    match result.converged_at {
        Some(round) => info!("All {} servers decided in round {}", result.node_count, round),
        None => info!(
            "{} of {} servers decided within {} rounds",
            result.decided, result.node_count, result.rounds_executed
        ),
    }
    if algorithm == Algorithm::Election {
        info!("LEADER: {:?}", result.leader());
    }
    Ok(())
}
