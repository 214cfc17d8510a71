//! CSV Export Example
//!
//! Run with: cargo run --example csv_export_test --release
//!
//! Events are written to one CSV file while a collector keeps them in memory
//! for a quick per-node analysis.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;
use simple_logger::SimpleLogger;

use tw_rust::tw_event_sinks::{CollectorEventSink, CsvEventSink, MultiEventSink};
use tw_rust::{Scheduler, SimConfig, SimError, TopologyConfig, TopologyKind};

fn main() -> Result<(), SimError> {
    SimpleLogger::new().init().unwrap();

    info!("Running simulation with CSV export enabled...");

    let config = SimConfig {
        topology: TopologyConfig {
            kind: TopologyKind::Arbitrary,
            node_count: 20,
            ..Default::default()
        },
        seed: Some(42),
        ..Default::default()
    };

    let collector = Rc::new(RefCell::new(CollectorEventSink::new()));
    let mut sinks = MultiEventSink::new();
    sinks.add_sink(Box::new(CsvEventSink::new("sim_events.csv")?));
    sinks.add_sink(Box::new(collector.clone()));

    let result = Scheduler::new_with_sink(config, Box::new(sinks))?.run()?;

    info!("\n=== Simulation Results ===");
    info!("Seed used: {}", result.seed_used);
    info!("Leader: {:?}", result.leader());

    let collector = collector.borrow();
    for node in result.states.keys() {
        info!(
            "  node {:>3}: {} events, decided in round {:?}",
            node,
            collector.for_node(*node).count(),
            collector.decided_in(*node)
        );
    }

    info!("\n=== CSV File Generated ===");
    info!("All events exported to: sim_events.csv");
    info!("\nAnalysis examples:");
    info!("  # Count decisions");
    info!("  grep Decided sim_events.csv | wc -l");
    info!("  ");
    info!("  # Python analysis");
    info!("  df = pd.read_csv('sim_events.csv')");
    info!("  sent_per_node = df[df['event_type']=='Sent'].groupby('node').size()");
    Ok(())
}
