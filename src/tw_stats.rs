// Simulation Statistics

use std::collections::BTreeMap;

use crate::tw_interface::{Algorithm, Event, NodeId, Outcome, Round, Value, WaveState};

/// Complete simulation result
#[derive(Debug, Clone)]
pub struct SimResult {
    pub algorithm: Algorithm,
    pub topology: &'static str,
    pub node_count: usize,
    pub diameter: usize,

    /// Rounds actually executed and the budget they were drawn from
    pub rounds_executed: Round,
    pub round_budget: Round,
    /// First round after which every node had decided
    pub converged_at: Option<Round>,

    pub decided: usize,
    pub states: BTreeMap<NodeId, WaveState>,
    /// Election runs only
    pub outcomes: BTreeMap<NodeId, Outcome>,
    pub values: BTreeMap<NodeId, Value>,
    pub leaders: Vec<NodeId>,
    pub initiators: Vec<NodeId>,

    pub counts: EventCounts,
    /// Tokens still sitting in inboxes at the end
    pub in_flight: usize,

    pub seed_used: u64,
    /// blake3 over every event of the run, verbose or not
    pub trace_digest: String,
}

impl SimResult {
    pub fn converged(&self) -> bool {
        self.converged_at.is_some()
    }

    /// The single leader, if the election produced exactly one
    pub fn leader(&self) -> Option<NodeId> {
        match self.leaders.as_slice() {
            [leader] => Some(*leader),
            _ => None,
        }
    }

    pub fn lost_count(&self) -> usize {
        self.outcomes.values().filter(|o| **o == Outcome::Lost).count()
    }

    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║        Tree Wave Simulation Results                    ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Configuration:");
        println!("  Algorithm: {:?}", self.algorithm);
        println!(
            "  Topology: {} ({} nodes, diameter {})",
            self.topology, self.node_count, self.diameter
        );
        println!("  Seed: {}", self.seed_used);
        println!("  Rounds: {}/{}\n", self.rounds_executed, self.round_budget);

        println!("Outcome:");
        match self.converged_at {
            Some(round) => println!("  Every node decided by round {}", round),
            None => println!("  {}/{} nodes decided", self.decided, self.node_count),
        }
        if !self.outcomes.is_empty() {
            println!("  Initiators: {:?}", self.initiators);
            println!("  Leaders: {:?} ({} lost)", self.leaders, self.lost_count());
        }
        println!();

        println!("Message Statistics:");
        println!("  Tokens: {} sent, {} received", self.counts.sent, self.counts.received);
        if self.counts.wakeups_sent > 0 {
            println!(
                "  Wake-ups: {} sent, {} received",
                self.counts.wakeups_sent, self.counts.wakeups_received
            );
        }
        println!("  In flight at end: {}", self.in_flight);
        println!(
            "  Active rounds: {} ({} idle activations)",
            self.counts.active_rounds, self.counts.no_actions
        );
        println!("\nTrace digest: {}", self.trace_digest);
    }
}

/// Message complexity and activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub sent: usize,
    pub received: usize,
    pub wakeups_sent: usize,
    pub wakeups_received: usize,
    pub decisions: usize,
    pub no_actions: usize,
    /// Rounds with at least one state change
    pub active_rounds: usize,
}

impl EventCounts {
    pub fn record(&mut self, event: &Event) {
        match event {
            Event::RoundStarted { .. } => {}
            Event::Sent { .. } => self.sent += 1,
            Event::Received { .. } => self.received += 1,
            Event::WakeupSent { .. } => self.wakeups_sent += 1,
            Event::WakeupReceived { .. } => self.wakeups_received += 1,
            Event::Decided { .. } => self.decisions += 1,
            Event::NoAction { .. } => self.no_actions += 1,
        }
    }

    /// Protocol messages of both kinds
    pub fn total_messages(&self) -> usize {
        self.sent + self.wakeups_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tw_interface::{Decision, NoActionReason};

    #[test]
    fn test_counts_record_each_kind() {
        let mut counts = EventCounts::default();
        let events = [
            Event::RoundStarted { chosen: vec![0, 1] },
            Event::Sent { from: 0, to: 1 },
            Event::Received { by: 1, from: 0 },
            Event::WakeupSent { from: 1, to: 0 },
            Event::WakeupReceived { by: 0, from: 1 },
            Event::Decided {
                node: 1,
                decision: Decision::Lost,
            },
            Event::NoAction {
                node: 0,
                reason: NoActionReason::Idle,
            },
        ];
        for event in &events {
            counts.record(event);
        }

        assert_eq!(counts.sent, 1);
        assert_eq!(counts.received, 1);
        assert_eq!(counts.wakeups_sent, 1);
        assert_eq!(counts.wakeups_received, 1);
        assert_eq!(counts.decisions, 1);
        assert_eq!(counts.no_actions, 1);
        assert_eq!(counts.total_messages(), 2);
    }
}
