// Scenario Runner - Load and execute scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/single_initiator_path.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/balanced_seven.yaml --seed 42

use std::env;
use std::fs;
use std::path::Path;

use log::{error, info};
use simple_logger::SimpleLogger;

use tw_rust::tw_event_sinks::ConsoleEventSink;
use tw_rust::{NoOpSink, NodeId, Scheduler, SimConfig, SimError, SimResult};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    meta: ScenarioMeta,

    #[serde(default)]
    config: SimConfig,

    /// Checked after the run
    #[serde(default)]
    expect: Expectations,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct Expectations {
    converged: Option<bool>,
    leader: Option<NodeId>,
}

fn main() {
    SimpleLogger::new().init().unwrap();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED] [--log]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/balanced_seven.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/balanced_seven.yaml --seed 42", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);

    let mut seed = None;
    let mut show_events = false;
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--seed" => seed = rest.next().map(|s| parse_seed(s)),
            "--log" => show_events = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    let outcome = if path.is_file() {
        run_scenario_file(path, seed, show_events).map(|passed| vec![passed])
    } else if path.is_dir() {
        run_scenario_directory(path, seed, show_events)
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    };

    match outcome {
        Ok(results) if results.iter().all(|passed| *passed) => {}
        Ok(results) => {
            let failed = results.iter().filter(|passed| !**passed).count();
            error!("{} of {} scenario(s) did not meet expectations", failed, results.len());
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run_scenario_directory(
    dir: &Path,
    seed: Option<u64>,
    show_events: bool,
) -> Result<Vec<bool>, SimError> {
    let mut scenarios = Vec::new();

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let ext = path.extension().and_then(|s| s.to_str());
        if ext == Some("yaml") || ext == Some("yml") {
            scenarios.push(path);
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("Found {} scenario(s) to run\n", scenarios.len());

    let mut results = Vec::new();
    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        results.push(run_scenario_file(scenario_path, seed, show_events)?);
    }

    println!("\nAll scenarios complete!\n");
    Ok(results)
}

/// Returns whether the run met the scenario's expectations
fn run_scenario_file(path: &Path, seed: Option<u64>, show_events: bool) -> Result<bool, SimError> {
    info!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path)?;
    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content)?;

    match scenario.meta.name {
        Some(ref name) => println!("== {} ==", name),
        None => println!("== {} ==", path.display()),
    }
    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    let mut config = scenario.config;
    if seed.is_some() {
        config.seed = seed;
    }

    println!("Configuration:");
    println!("  Algorithm: {:?}", config.algorithm);
    println!("  Topology: {:?} ({} nodes)", config.topology.kind, config.topology.node_count);
    println!("  Activation: {:?}", config.activation);
    println!("  Initiators: {:?}", config.initiators);
    println!("  Iteration factor: {}", config.iteration_factor);

    let mut scheduler = if show_events {
        Scheduler::new_with_sink(config, Box::new(ConsoleEventSink::new(true)))?
    } else {
        Scheduler::new_with_sink(config, Box::new(NoOpSink))?
    };
    println!("\n{}", scheduler.topology());

    let result = scheduler.run()?;
    result.print_summary();

    Ok(check_expectations(&scenario.expect, &result))
}

fn check_expectations(expect: &Expectations, result: &SimResult) -> bool {
    let mut passed = true;
    if let Some(converged) = expect.converged {
        if result.converged() != converged {
            error!("expected converged = {}, got {}", converged, result.converged());
            passed = false;
        }
    }
    if let Some(leader) = expect.leader {
        if result.leader() != Some(leader) {
            error!("expected leader {}, got {:?}", leader, result.leaders);
            passed = false;
        }
    }
    if passed {
        println!("\n✓ Scenario complete!\n");
    }
    passed
}

fn parse_seed(text: &str) -> u64 {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.unwrap_or_else(|e| {
        eprintln!("Invalid seed {}: {}", text, e);
        std::process::exit(1);
    })
}
