//! Round-based scheduler
//!
//! Each round activates a random subset of the nodes (or every node) and steps
//! them once, in sampling order. The run lasts `n * iteration_factor` rounds
//! unless early exit is enabled. All randomness, including the topology shape
//! when built from a configuration, comes from one seeded `StdRng`.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::tw_config::{ActivationPolicy, InitiatorPolicy, SimConfig};
use crate::tw_election::ElectionEngine;
use crate::tw_error::{ConfigurationError, ProtocolError, SimError};
use crate::tw_interface::{
    Algorithm, Event, EventSink, NoOpSink, NodeId, Protocol, Round, RoundBuffer,
};
use crate::tw_node::NodeArena;
use crate::tw_stats::{EventCounts, SimResult};
use crate::tw_topology::Topology;
use crate::tw_wave::WaveEngine;

pub struct Scheduler {
    config: SimConfig,
    rng: StdRng,
    seed_used: u64,

    topology: Topology,
    arena: NodeArena,
    ids: Vec<NodeId>,
    protocol: Box<dyn Protocol>,
    initiators: Vec<NodeId>,

    sink: Box<dyn EventSink>,
    buffer: RoundBuffer,

    round: Round,
    round_budget: Round,
    converged_at: Option<Round>,
    counts: EventCounts,
    trace: blake3::Hasher,
}

impl Scheduler {
    /// Build the topology from the configuration and discard all events
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        Self::new_with_sink(config, Box::new(NoOpSink))
    }

    pub fn new_with_sink(config: SimConfig, sink: Box<dyn EventSink>) -> Result<Self, SimError> {
        config.validate()?;
        let (seed_used, mut rng) = Self::seeded_rng(&config);
        let topology = Topology::build(&config.topology, &mut rng)?;
        Self::assemble(config, topology, rng, seed_used, sink)
    }

    /// Run on a prepared topology; `config.topology` is ignored
    pub fn with_topology(
        config: SimConfig,
        topology: Topology,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let (seed_used, rng) = Self::seeded_rng(&config);
        Self::assemble(config, topology, rng, seed_used, sink)
    }

    fn seeded_rng(config: &SimConfig) -> (u64, StdRng) {
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        (seed, StdRng::seed_from_u64(seed))
    }

    fn assemble(
        config: SimConfig,
        topology: Topology,
        mut rng: StdRng,
        seed_used: u64,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, SimError> {
        let adjacency = topology.adjacency();
        adjacency.validate()?;

        let (mut arena, protocol): (NodeArena, Box<dyn Protocol>) = match config.algorithm {
            Algorithm::Wave => (
                NodeArena::for_wave(&adjacency),
                Box::new(WaveEngine::new(config.flood_wave_decision)),
            ),
            Algorithm::Election => (NodeArena::for_election(&adjacency), Box::new(ElectionEngine::new())),
        };
        let ids = arena.ids();

        let initiators = match config.algorithm {
            Algorithm::Wave => Vec::new(),
            Algorithm::Election => {
                let chosen = Self::choose_initiators(&config.initiators, &ids, &mut rng)?;
                for id in &chosen {
                    arena.make_initiator(*id)?;
                }
                chosen
            }
        };

        let round_budget = ids.len() as Round * config.iteration_factor;

        Ok(Self {
            config,
            rng,
            seed_used,
            topology,
            arena,
            ids,
            protocol,
            initiators,
            sink,
            buffer: RoundBuffer::new(),
            round: 0,
            round_budget,
            converged_at: None,
            counts: EventCounts::default(),
            trace: blake3::Hasher::new(),
        })
    }

    /// Initiator ids in ascending order
    fn choose_initiators(
        policy: &InitiatorPolicy,
        ids: &[NodeId],
        rng: &mut StdRng,
    ) -> Result<Vec<NodeId>, ConfigurationError> {
        let mut chosen = match policy {
            InitiatorPolicy::All => ids.to_vec(),
            InitiatorPolicy::Random => {
                let n = ids.len();
                if n == 1 {
                    ids.to_vec()
                } else {
                    let count = rng.gen_range(1..n);
                    index::sample(rng, n, count).into_iter().map(|i| ids[i]).collect()
                }
            }
            InitiatorPolicy::Explicit(explicit) => {
                for id in explicit {
                    if ids.binary_search(id).is_err() {
                        return Err(ConfigurationError::UnknownInitiator(*id));
                    }
                }
                explicit.clone()
            }
        };
        chosen.sort_unstable();
        chosen.dedup();
        if chosen.is_empty() {
            return Err(ConfigurationError::NoInitiators);
        }
        Ok(chosen)
    }

    /// Nodes to activate this round, in visiting order
    fn select_active(&mut self) -> Vec<NodeId> {
        let n = self.ids.len();
        match self.config.activation {
            ActivationPolicy::Everyone => self.ids.clone(),
            ActivationPolicy::RandomSubset => {
                let k = if n == 1 { 1 } else { self.rng.gen_range(1..n) };
                index::sample(&mut self.rng, n, k)
                    .into_iter()
                    .map(|i| self.ids[i])
                    .collect()
            }
        }
    }

    /// Run the whole round budget (or until convergence with early exit)
    pub fn run(&mut self) -> Result<SimResult, SimError> {
        info!(
            "Running {:?} on {} tree of {} nodes for up to {} rounds (seed {})",
            self.config.algorithm,
            self.topology.kind_name(),
            self.ids.len(),
            self.round_budget,
            self.seed_used
        );
        if self.config.algorithm == Algorithm::Election {
            info!("Initiators: {:?}", self.initiators);
        }

        while self.round < self.round_budget {
            self.step_round()?;
            if self.config.early_exit && self.converged_at.is_some() {
                break;
            }
        }

        let result = self.result();
        match result.converged_at {
            Some(at) => info!(
                "Every node decided by round {} ({} messages, {} wake-ups, leaders {:?})",
                at, result.counts.sent, result.counts.wakeups_sent, result.leaders
            ),
            None => warn!(
                "Round budget exhausted with {}/{} nodes decided",
                result.decided, result.node_count
            ),
        }
        Ok(result)
    }

    /// Execute a single round. Returns whether any node changed state.
    pub fn step_round(&mut self) -> Result<bool, ProtocolError> {
        let round = self.round;
        let chosen = self.select_active();

        self.buffer.clear();
        for id in &chosen {
            self.protocol
                .step(&mut self.arena, *id, round, &mut self.buffer)?;
        }
        let changed = self.buffer.has_state_change();
        debug!(
            "Round {}: {} nodes chosen, {} events, changed: {}",
            round,
            chosen.len(),
            self.buffer.events.len(),
            changed
        );

        self.record_round(round, chosen, changed);
        self.round += 1;

        if self.converged_at.is_none() && self.arena.all_decided() {
            self.converged_at = Some(round);
            debug!("All nodes decided in round {}", round);
        }
        Ok(changed)
    }

    /// Hash and count every event, then forward what the log mode keeps
    fn record_round(&mut self, round: Round, chosen: Vec<NodeId>, changed: bool) {
        let started = Event::RoundStarted { chosen };
        let events = std::mem::take(&mut self.buffer.events);

        for event in std::iter::once(&started).chain(events.iter()) {
            self.trace.update(format!("{} {:?}\n", round, event).as_bytes());
            self.counts.record(event);
        }
        if changed {
            self.counts.active_rounds += 1;
        }

        let verbose = self.config.verbose_log;
        if !verbose && !changed {
            return;
        }
        self.sink.log(round, started);
        for event in events {
            if verbose || event.changes_state() {
                self.sink.log(round, event);
            }
        }
    }

    /// Snapshot of the run so far
    pub fn result(&self) -> SimResult {
        let mut states = BTreeMap::new();
        let mut outcomes = BTreeMap::new();
        let mut values = BTreeMap::new();
        for node in self.arena.iter() {
            states.insert(node.id(), node.state());
            if let Some(outcome) = node.outcome() {
                outcomes.insert(node.id(), outcome);
            }
            if let Some(value) = node.value() {
                values.insert(node.id(), value);
            }
        }

        SimResult {
            algorithm: self.config.algorithm,
            topology: self.topology.kind_name(),
            node_count: self.ids.len(),
            diameter: self.topology.adjacency().diameter(),
            rounds_executed: self.round,
            round_budget: self.round_budget,
            converged_at: self.converged_at,
            decided: self.arena.decided_count(),
            states,
            outcomes,
            values,
            leaders: self.arena.leaders(),
            initiators: self.initiators.clone(),
            counts: self.counts,
            in_flight: self.arena.in_flight(),
            seed_used: self.seed_used,
            trace_digest: self.trace.finalize().to_hex().to_string(),
        }
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn seed_used(&self) -> u64 {
        self.seed_used
    }

    pub fn initiators(&self) -> &[NodeId] {
        &self.initiators
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::tw_config::{TopologyConfig, TopologyKind};
    use crate::tw_event_sinks::CollectorEventSink;
    use crate::tw_interface::{Outcome, WaveState};
    use crate::tw_topology::Adjacency;

    fn config(algorithm: Algorithm, kind: TopologyKind, n: usize, seed: u64) -> SimConfig {
        SimConfig {
            algorithm,
            topology: TopologyConfig {
                kind,
                node_count: n,
                ..Default::default()
            },
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_balanced_seven_all_initiators() {
        for algorithm in [Algorithm::Wave, Algorithm::Election] {
            for seed in 0..5 {
                let mut cfg = config(algorithm, TopologyKind::BinaryBalanced, 7, seed);
                cfg.initiators = InitiatorPolicy::All;
                let result = Scheduler::new(cfg).unwrap().run().unwrap();

                assert_eq!(result.rounds_executed, 700);
                assert!(result.converged_at.unwrap() < 700);
                assert_eq!(result.decided, 7);
                assert!(result.states.values().all(|s| *s == WaveState::Decided));
                assert_eq!(result.in_flight, 0);
                if algorithm == Algorithm::Election {
                    assert_eq!(result.leaders, vec![0]);
                    assert_eq!(result.lost_count(), 6);
                    assert!(result.values.values().all(|v| *v == 0));
                }
            }
        }
    }

    #[test]
    fn test_path_with_custom_ids_elects_sole_initiator() {
        let topology = Topology::Explicit(Adjacency::from_edges(&[], &[(5, 2), (2, 9)]));
        let cfg = SimConfig {
            seed: Some(3),
            initiators: InitiatorPolicy::Explicit(vec![2]),
            ..Default::default()
        };
        let mut scheduler = Scheduler::with_topology(cfg, topology, Box::new(NoOpSink)).unwrap();
        let result = scheduler.run().unwrap();

        assert_eq!(result.leaders, vec![2]);
        assert_eq!(result.outcomes[&5], Outcome::Lost);
        assert_eq!(result.outcomes[&9], Outcome::Lost);
        assert_eq!(result.initiators, vec![2]);
    }

    #[test]
    fn test_single_node_becomes_leader() {
        let cfg = config(Algorithm::Election, TopologyKind::Path, 1, 11);
        let mut scheduler = Scheduler::new(cfg).unwrap();
        assert_eq!(scheduler.initiators(), &[0]);

        let result = scheduler.run().unwrap();
        assert_eq!(result.rounds_executed, 100);
        assert_eq!(result.converged_at, Some(0));
        assert_eq!(result.leader(), Some(0));
        assert_eq!(result.counts.total_messages(), 0);
    }

    #[test]
    fn test_single_node_wave_decides() {
        let cfg = config(Algorithm::Wave, TopologyKind::Arbitrary, 1, 0);
        let result = Scheduler::new(cfg).unwrap().run().unwrap();
        assert_eq!(result.converged_at, Some(0));
        assert_eq!(result.counts.decisions, 1);
    }

    #[test]
    fn test_two_initiators_converge_to_zero() {
        let mut cfg = config(Algorithm::Election, TopologyKind::Path, 2, 5);
        cfg.initiators = InitiatorPolicy::All;
        let result = Scheduler::new(cfg).unwrap().run().unwrap();

        assert_eq!(result.values[&0], 0);
        assert_eq!(result.values[&1], 0);
        assert_eq!(result.outcomes[&0], Outcome::Leader);
        assert_eq!(result.outcomes[&1], Outcome::Lost);
    }

    #[test]
    fn test_message_complexity() {
        let n = 12;
        let mut cfg = config(Algorithm::Wave, TopologyKind::Arbitrary, n, 8);
        cfg.flood_wave_decision = false;
        let result = Scheduler::new(cfg).unwrap().run().unwrap();
        assert_eq!(result.counts.sent, n);
        assert_eq!(result.counts.received, n);
        assert_eq!(result.decided, 2);
        assert!(result.converged_at.is_none());

        let cfg = config(Algorithm::Election, TopologyKind::Arbitrary, n, 8);
        let result = Scheduler::new(cfg).unwrap().run().unwrap();
        assert_eq!(result.counts.sent, 2 * n - 2);
        assert_eq!(result.counts.received, 2 * n - 2);
        assert_eq!(result.counts.wakeups_sent, 2 * n - 2);
        assert_eq!(result.counts.wakeups_received, 2 * n - 2);
        assert_eq!(result.counts.decisions, n);
    }

    #[test]
    fn test_random_initiators_elect_minimum() {
        for seed in 0..20 {
            let cfg = config(Algorithm::Election, TopologyKind::BinaryUnbalanced, 20, seed);
            let mut scheduler = Scheduler::new(cfg).unwrap();
            let initiators = scheduler.initiators().to_vec();
            assert!(!initiators.is_empty() && initiators.len() < 20);

            let result = scheduler.run().unwrap();
            assert!(result.converged());
            assert_eq!(result.leaders, vec![initiators[0]]);
        }
    }

    #[test]
    fn test_same_seed_same_trace() {
        let run = |seed| {
            let cfg = config(Algorithm::Election, TopologyKind::Arbitrary, 15, seed);
            Scheduler::new(cfg).unwrap().run().unwrap()
        };
        let a = run(42);
        let b = run(42);
        assert_eq!(a.trace_digest, b.trace_digest);
        assert_eq!(a.counts, b.counts);
        assert_eq!(a.converged_at, b.converged_at);
        assert_eq!(a.seed_used, 42);

        assert_ne!(run(43).trace_digest, a.trace_digest);
    }

    #[test]
    fn test_everyone_activation_terminates_within_diameter_bound() {
        for algorithm in [Algorithm::Wave, Algorithm::Election] {
            for kind in [
                TopologyKind::Arbitrary,
                TopologyKind::BinaryUnbalanced,
                TopologyKind::Path,
            ] {
                let mut cfg = config(algorithm, kind, 30, 9);
                cfg.activation = ActivationPolicy::Everyone;
                let result = Scheduler::new(cfg).unwrap().run().unwrap();

                let bound = 3 * (result.diameter as Round + 2);
                let at = result.converged_at.unwrap();
                assert!(at <= bound, "{:?} {:?}: {} > {}", algorithm, kind, at, bound);
                if algorithm == Algorithm::Election {
                    assert_eq!(result.leaders.len(), 1);
                    assert_eq!(result.lost_count(), 29);
                }
            }
        }
    }

    #[test]
    fn test_early_exit_stops_after_convergence() {
        let mut cfg = config(Algorithm::Election, TopologyKind::Arbitrary, 10, 1);
        cfg.early_exit = true;
        let result = Scheduler::new(cfg).unwrap().run().unwrap();
        assert_eq!(result.rounds_executed, result.converged_at.unwrap() + 1);
        assert!(result.rounds_executed < result.round_budget);
    }

    #[test]
    fn test_unknown_initiator_rejected() {
        let mut cfg = config(Algorithm::Election, TopologyKind::Path, 3, 0);
        cfg.initiators = InitiatorPolicy::Explicit(vec![1, 7]);
        assert!(matches!(
            Scheduler::new(cfg),
            Err(SimError::Configuration(ConfigurationError::UnknownInitiator(7)))
        ));
    }

    #[test]
    fn test_invalid_topology_rejected() {
        let cyclic = Topology::Explicit(Adjacency::from_edges(&[], &[(0, 1), (1, 2), (2, 0)]));
        assert!(matches!(
            Scheduler::with_topology(SimConfig::default(), cyclic, Box::new(NoOpSink)),
            Err(SimError::Configuration(ConfigurationError::NotATree { .. }))
        ));
    }

    #[test]
    fn test_minimal_log_forwards_only_changing_rounds() {
        let collector = Rc::new(RefCell::new(CollectorEventSink::new()));
        let cfg = config(Algorithm::Election, TopologyKind::Arbitrary, 8, 4);
        let mut scheduler = Scheduler::new_with_sink(cfg, Box::new(collector.clone())).unwrap();
        let result = scheduler.run().unwrap();

        let sink = collector.borrow();
        assert_eq!(sink.count_no_actions(), 0);
        assert_eq!(sink.count_rounds(), result.counts.active_rounds);
        assert_eq!(sink.count_sent(), result.counts.sent);
    }

    #[test]
    fn test_verbose_log_forwards_everything() {
        let collector = Rc::new(RefCell::new(CollectorEventSink::new()));
        let mut cfg = config(Algorithm::Election, TopologyKind::Arbitrary, 8, 4);
        cfg.verbose_log = true;
        let mut scheduler = Scheduler::new_with_sink(cfg, Box::new(collector.clone())).unwrap();
        let result = scheduler.run().unwrap();

        let sink = collector.borrow();
        assert_eq!(sink.count_no_actions(), result.counts.no_actions);
        assert_eq!(sink.count_rounds() as Round, result.rounds_executed);
        assert!(sink.count_no_actions() > 0);
    }

    #[test]
    fn test_verbose_flag_does_not_change_trace() {
        let mut quiet = config(Algorithm::Wave, TopologyKind::BinaryBalanced, 9, 17);
        let mut loud = quiet.clone();
        loud.verbose_log = true;
        quiet.verbose_log = false;

        let a = Scheduler::new(quiet).unwrap().run().unwrap();
        let b = Scheduler::new(loud).unwrap().run().unwrap();
        assert_eq!(a.trace_digest, b.trace_digest);
    }
}
