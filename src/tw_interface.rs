use serde::{Deserialize, Serialize};

use crate::tw_error::ProtocolError;
use crate::tw_node::NodeArena;

// all the same numeric type so ids can double as election values
pub type NodeId = u64;
pub type Value = NodeId;
pub type Round = u64;

/// Election value of a node that has not heard of any initiator yet
pub const INFINITY: Value = Value::MAX;

/// Rounds per node in the default round budget (`n * ITERATION_FACTOR`)
pub const ITERATION_FACTOR: u64 = 100;

/// One mailbox entry. The wave carries no value, the election snapshots the
/// sender's value at send time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub from: NodeId,
    pub value: Option<Value>,
}

/// Externally visible phase of the wave algorithm
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaveState {
    Active,
    Decided,
}

/// Election outcome of a node
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Sleeping,
    Waiting,
    Leader,
    Lost,
}

impl Outcome {
    pub fn is_final(&self) -> bool {
        matches!(self, Outcome::Leader | Outcome::Lost)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Wave,
    Election,
}

/// What a node concluded when it decided
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Plain wave: the node detected termination
    Terminated,
    Leader,
    Lost,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Terminated => "DECIDE",
            Decision::Leader => "LEADER",
            Decision::Lost => "LOST",
        }
    }
}

/// Why an activated node did nothing
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NoActionReason {
    /// Not woken yet and not an initiator
    Sleeping,
    /// Woken but still missing wake-ups from some neighbours
    AwaitingWakeups,
    /// More than one neighbour has not sent its token
    WaitingForSilent,
    /// Token already sent, nothing in the inbox
    Idle,
}

// ============================================================================
// Event Logging System
// ============================================================================

/// Events emitted by the protocol engines and the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Nodes activated in this round, in visiting order
    RoundStarted { chosen: Vec<NodeId> },
    Sent { from: NodeId, to: NodeId },
    Received { by: NodeId, from: NodeId },
    WakeupSent { from: NodeId, to: NodeId },
    WakeupReceived { by: NodeId, from: NodeId },
    Decided { node: NodeId, decision: Decision },
    NoAction { node: NodeId, reason: NoActionReason },
}

impl Event {
    /// Whether the event records a change of some node's protocol state
    pub fn changes_state(&self) -> bool {
        !matches!(self, Event::RoundStarted { .. } | Event::NoAction { .. })
    }
}

/// Trait for consuming events from the simulation
pub trait EventSink {
    fn log(&mut self, round: Round, event: Event);
}

/// No-op event sink (zero overhead)
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _round: Round, _event: Event) {}
}

/// Buffers the events of one round so the scheduler can decide whether the
/// round is worth forwarding
#[derive(Default)]
pub struct RoundBuffer {
    pub events: Vec<Event>,
}

impl RoundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_state_change(&self) -> bool {
        self.events.iter().any(Event::changes_state)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RoundBuffer {
    fn log(&mut self, _round: Round, event: Event) {
        self.events.push(event);
    }
}

// ============================================================================
// Protocol Abstraction
// ============================================================================

/// A protocol advances one node by one activation.
///
/// A step may mutate the stepped node freely, but other nodes only through
/// `NodeArena::post` and `NodeArena::post_wakeup`.
pub trait Protocol {
    fn algorithm(&self) -> Algorithm;

    /// Run one activation of `id`. Returns true when the node changed state.
    fn step(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ProtocolError>;
}
