//! Tree election on top of the wave.
//!
//! Initiators flood wake-ups; a node joins the wave only after every
//! neighbour has woken it. Tokens carry the sender's smallest known value, the
//! two nodes on the final link learn the global minimum, and their decision
//! floods back through the tree. The node whose id equals the minimum wins.

use crate::tw_error::ProtocolError;
use crate::tw_interface::{
    Algorithm, Decision, Event, EventSink, NoActionReason, NodeId, Outcome, Protocol, Round, Token,
};
use crate::tw_node::{NodeArena, NodeState};
use crate::tw_wave::{idle_reason, wave_step, WaveEngine, WaveHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct ElectionEngine;

impl ElectionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Every neighbour has sent its wake-up
    pub fn is_awake(node: &NodeState) -> bool {
        node.election()
            .map(|e| e.wake_received() == node.neighbors().len())
            .unwrap_or(false)
    }

    /// Push a wake-up into every neighbour's wake inbox. Returns false if the
    /// node had already done so.
    pub fn send_wakeups(
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ProtocolError> {
        let node = arena.get_mut(id)?;
        let targets: Vec<NodeId> = node.neighbors().iter().copied().collect();
        let election = node.election_mut()?;
        if election.wake_sent {
            return Ok(false);
        }
        election.wake_sent = true;

        for to in targets {
            arena.post_wakeup(to, id)?;
            sink.log(round, Event::WakeupSent { from: id, to });
        }
        Ok(true)
    }

    /// Consume one wake-up. A node woken for the first time passes the
    /// wake-up on to all of its neighbours.
    pub fn receive_wakeup(
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<NodeId, ProtocolError> {
        let node = arena.get_mut(id)?;
        let neighbor_count = node.neighbors().len();
        let election = node.election_mut()?;
        if election.wake_received >= neighbor_count {
            return Err(ProtocolError::WakeupOverflow { node: id });
        }
        let from = election
            .wake_inbox
            .pop_front()
            .ok_or(ProtocolError::EmptyWakeupInbox { node: id })?;
        election.wake_received += 1;
        if election.outcome == Outcome::Sleeping {
            election.outcome = Outcome::Waiting;
        }
        let wake_sent = election.wake_sent;

        sink.log(round, Event::WakeupReceived { by: id, from });
        if !wake_sent {
            Self::send_wakeups(arena, id, round, sink)?;
        }
        Ok(from)
    }

    /// Receive a token and keep the smaller of the two values
    pub fn receive_with_value(
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<Token, ProtocolError> {
        let token = WaveEngine::receive(arena, id, round, sink)?;
        let election = arena.get_mut(id)?.election_mut()?;
        if let Some(value) = token.value {
            election.value = election.value.min(value);
        }
        Ok(token)
    }

    /// Settle the outcome and pass the decision to every neighbour except the
    /// one it came from
    pub fn decide(
        arena: &mut NodeArena,
        id: NodeId,
        last_sender: Option<NodeId>,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<Outcome, ProtocolError> {
        let node = arena.get_mut(id)?;
        if node.is_decided() || node.outcome().map(|o| o.is_final()).unwrap_or(false) {
            return Err(ProtocolError::RedundantDecision { node: id });
        }
        let election = node.election_mut()?;
        let value = election.value;
        let (outcome, decision) = if value == id {
            (Outcome::Leader, Decision::Leader)
        } else {
            (Outcome::Lost, Decision::Lost)
        };
        election.outcome = outcome;
        WaveEngine::mark_decided(arena, id)?;
        sink.log(round, Event::Decided { node: id, decision });

        let token = Token {
            from: id,
            value: Some(value),
        };
        WaveEngine::broadcast(arena, id, last_sender, token, round, sink)?;
        Ok(outcome)
    }

    fn no_action_reason(node: &NodeState) -> NoActionReason {
        match node.election() {
            Some(e) if e.outcome() == Outcome::Sleeping => NoActionReason::Sleeping,
            Some(_) if !Self::is_awake(node) => NoActionReason::AwaitingWakeups,
            _ => idle_reason(node),
        }
    }
}

impl WaveHooks for ElectionEngine {
    fn receive(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<Token, ProtocolError> {
        Self::receive_with_value(arena, id, round, sink)
    }

    fn token(&self, node: &NodeState) -> Token {
        Token {
            from: node.id(),
            value: node.value(),
        }
    }

    fn decide(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        last_sender: Option<NodeId>,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<(), ProtocolError> {
        ElectionEngine::decide(arena, id, last_sender, round, sink).map(|_| ())
    }
}

impl Protocol for ElectionEngine {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Election
    }

    fn step(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ProtocolError> {
        let mut acted = false;

        // wake-up phase
        let node = arena.get(id)?;
        let election = node.election().ok_or(ProtocolError::NotAnElectionNode(id))?;
        if election.is_initiator() && !election.wake_sent() {
            acted |= Self::send_wakeups(arena, id, round, sink)?;
        }
        loop {
            let node = arena.get(id)?;
            let election = node.election().ok_or(ProtocolError::NotAnElectionNode(id))?;
            if election.wake_received() >= node.neighbors().len() || election.pending_wakeups() == 0 {
                break;
            }
            Self::receive_wakeup(arena, id, round, sink)?;
            acted = true;
        }

        // wave phase, only once fully woken
        if Self::is_awake(arena.get(id)?) {
            acted |= wave_step(self, arena, id, round, sink)?;
        }

        if !acted {
            let reason = Self::no_action_reason(arena.get(id)?);
            sink.log(round, Event::NoAction { node: id, reason });
        }
        Ok(acted)
    }
}
