//! # twRust - Wave and Tree Election Simulator
//!
//! A discrete-event simulator of the tree (echo) wave algorithm and of leader
//! election on trees built on top of it. Nodes live in an id-indexed arena and
//! talk only through FIFO mailboxes; a seeded round-based scheduler activates
//! a random subset of them every round.
//!
//! ## Core Components
//!
//! - **Topology**: arbitrary, binary search (balanced or not), path and explicit trees
//! - **NodeArena**: per-node wave state plus the optional election extension
//! - **WaveEngine / ElectionEngine**: the two protocols behind the `Protocol` trait
//! - **Scheduler**: random activation, round budget, event forwarding and results
//!
//! ```no_run
//! use tw_rust::{Scheduler, SimConfig};
//!
//! let config = SimConfig {
//!     seed: Some(7),
//!     ..Default::default()
//! };
//! let result = Scheduler::new(config)?.run()?;
//! println!("leader: {:?} after {:?} rounds", result.leader(), result.converged_at);
//! # Ok::<(), tw_rust::SimError>(())
//! ```
//!
//! Events go to an `EventSink`; see `tw_event_sinks` for console, CSV and
//! in-memory sinks.

// Protocol core
pub mod tw_interface;
pub mod tw_node;
pub mod tw_wave;
pub mod tw_election;

// Topology, configuration and the run loop
pub mod tw_topology;
pub mod tw_config;
pub mod tw_scheduler;
pub mod tw_stats;

pub mod tw_error;
pub mod tw_event_sinks;

// Re-export commonly used types
pub use tw_config::{ActivationPolicy, InitiatorPolicy, SimConfig, TopologyConfig, TopologyKind};
pub use tw_election::ElectionEngine;
pub use tw_error::{ConfigurationError, ProtocolError, SimError};
pub use tw_interface::{
    Algorithm, Decision, Event, EventSink, NoActionReason, NoOpSink, NodeId, Outcome, Protocol,
    Round, Token, Value, WaveState, INFINITY, ITERATION_FACTOR,
};
pub use tw_node::{NodeArena, NodeState};
pub use tw_scheduler::Scheduler;
pub use tw_stats::{EventCounts, SimResult};
pub use tw_topology::{Adjacency, ArbitraryTree, BinaryTree, Topology};
pub use tw_wave::WaveEngine;
