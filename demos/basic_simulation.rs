//! Basic simulation example: elect a leader on a random tree
//!
//! Run with: cargo run --example basic_simulation

use log::info;
use simple_logger::SimpleLogger;

use tw_rust::{
    ActivationPolicy, Algorithm, InitiatorPolicy, Scheduler, SimConfig, SimError, TopologyConfig,
    TopologyKind,
};

fn main() -> Result<(), SimError> {
    SimpleLogger::new().init().unwrap();

    info!("Setting up simulation...");

    let config = SimConfig {
        algorithm: Algorithm::Election,
        topology: TopologyConfig {
            kind: TopologyKind::Arbitrary,
            node_count: 200,
            min_children: Some(1),
            max_children: Some(5),
            ..Default::default()
        },
        seed: None, // Will be auto-generated
        activation: ActivationPolicy::RandomSubset,
        initiators: InitiatorPolicy::Random,
        early_exit: true,
        ..Default::default()
    };

    let mut scheduler = Scheduler::new(config)?;
    info!(
        "Tree depth: {}, levels: {:?}",
        scheduler.topology().depth(),
        scheduler.topology().levels_population()
    );

    info!("Starting simulation...");
    let result = scheduler.run()?;

    info!("Simulation complete!");
    info!("Seed used: {}", result.seed_used);

    match result.converged_at {
        Some(round) => info!(
            "Converged in round {} (diameter {}). Leader: {:?}",
            round,
            result.diameter,
            result.leader()
        ),
        None => info!("No convergence within {} rounds", result.round_budget),
    }
    info!(
        "Messages: {} tokens, {} wake-ups ({} total for {} nodes)",
        result.counts.sent,
        result.counts.wakeups_sent,
        result.counts.total_messages(),
        result.node_count
    );
    Ok(())
}
