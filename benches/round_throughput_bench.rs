use std::time::Instant;

use tw_rust::{
    ActivationPolicy, Algorithm, Scheduler, SimConfig, TopologyConfig, TopologyKind,
};

/// Benchmark rounds per second and rounds to convergence across tree sizes
fn main() {
    std::env::set_var("RUST_LOG", "error");
    let _ = simple_logger::init_with_level(log::Level::Error);

    println!("\n=== Round Throughput Benchmark ===\n");

    let sizes = [10usize, 100, 1_000, 5_000];
    let shapes = [
        ("arbitrary", TopologyKind::Arbitrary),
        ("balanced", TopologyKind::BinaryBalanced),
        ("unbalanced", TopologyKind::BinaryUnbalanced),
    ];

    println!(
        "{:<10} {:<12} {:>7} {:>10} {:>12} {:>14} {:>10}",
        "Algorithm", "Shape", "Nodes", "Diameter", "Converged", "Rounds/s", "Messages"
    );
    println!("{}", "-".repeat(82));

    for algorithm in [Algorithm::Wave, Algorithm::Election] {
        for (name, kind) in shapes {
            for n in sizes {
                let config = SimConfig {
                    algorithm,
                    topology: TopologyConfig {
                        kind,
                        node_count: n,
                        max_children: Some(4),
                        ..Default::default()
                    },
                    seed: Some(0x5eed),
                    activation: ActivationPolicy::RandomSubset,
                    early_exit: true,
                    ..Default::default()
                };

                let mut scheduler = match Scheduler::new(config) {
                    Ok(s) => s,
                    Err(e) => {
                        println!("{:<10} {:<12} {:>7} error: {}", format!("{:?}", algorithm), name, n, e);
                        continue;
                    }
                };

                let start = Instant::now();
                let result = match scheduler.run() {
                    Ok(r) => r,
                    Err(e) => {
                        println!("{:<10} {:<12} {:>7} error: {}", format!("{:?}", algorithm), name, n, e);
                        continue;
                    }
                };
                let elapsed = start.elapsed().as_secs_f64();

                println!(
                    "{:<10} {:<12} {:>7} {:>10} {:>12} {:>14.0} {:>10}",
                    format!("{:?}", algorithm),
                    name,
                    n,
                    result.diameter,
                    result
                        .converged_at
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    result.rounds_executed as f64 / elapsed.max(f64::EPSILON),
                    result.counts.total_messages()
                );
            }
        }
    }
    println!();
}
