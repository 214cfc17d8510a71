//! Echo/tree wave algorithm.
//!
//! A node collects tokens until at most one neighbour is silent, forwards its
//! own token to that silent neighbour, and decides once the silent neighbour's
//! token arrives. On a tree exactly the two endpoints of one link decide; with
//! decision flooding enabled they pass the decision on so every node decides.

use crate::tw_error::ProtocolError;
use crate::tw_interface::{
    Algorithm, Decision, Event, EventSink, NoActionReason, NodeId, Protocol, Round, Token,
    WaveState,
};
use crate::tw_node::{NodeArena, NodeState};

/// What differs between the plain wave and the election inside the wave phase
pub(crate) trait WaveHooks {
    /// Consume one token from the inbox
    fn receive(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<Token, ProtocolError>;

    /// Token a node sends to its silent neighbour
    fn token(&self, node: &NodeState) -> Token;

    /// Terminal decision. `last_sender` is `None` only for an isolated node.
    fn decide(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        last_sender: Option<NodeId>,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<(), ProtocolError>;
}

/// Drives the wave protocol, one node per invocation
#[derive(Debug, Clone, Copy)]
pub struct WaveEngine {
    flood_decision: bool,
}

impl Default for WaveEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl WaveEngine {
    pub fn new(flood_decision: bool) -> Self {
        Self { flood_decision }
    }

    pub fn has_silent(node: &NodeState) -> bool {
        node.has_silent()
    }

    pub fn silent_neighbor(node: &NodeState) -> Result<NodeId, ProtocolError> {
        node.silent_neighbor()
    }

    pub fn received_all(node: &NodeState) -> bool {
        node.received_all()
    }

    /// Pop the head of the inbox and mark its sender as heard from
    pub fn receive(
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<Token, ProtocolError> {
        let node = arena.get_mut(id)?;
        let token = node
            .inbox
            .pop_front()
            .ok_or(ProtocolError::EmptyInbox { node: id })?;
        match node.acked.get_mut(&token.from) {
            Some(acked) => *acked = true,
            None => {
                return Err(ProtocolError::UnknownNeighbor {
                    node: id,
                    from: token.from,
                })
            }
        }
        sink.log(round, Event::Received { by: id, from: token.from });
        Ok(token)
    }

    /// Forward a token to the silent neighbour. Returns false if it was
    /// already sent.
    pub fn send_to_silent(
        arena: &mut NodeArena,
        id: NodeId,
        token: Token,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ProtocolError> {
        let node = arena.get_mut(id)?;
        if node.sent_to_silent {
            return Ok(false);
        }
        let silent = node.silent_neighbor()?;
        node.sent_to_silent = true;

        arena.post(silent, token)?;
        sink.log(round, Event::Sent { from: id, to: silent });
        Ok(true)
    }

    /// Mark the node decided. Fails if it already was.
    pub(crate) fn mark_decided(arena: &mut NodeArena, id: NodeId) -> Result<(), ProtocolError> {
        let node = arena.get_mut(id)?;
        if node.state == WaveState::Decided {
            return Err(ProtocolError::RedundantDecision { node: id });
        }
        node.state = WaveState::Decided;
        Ok(())
    }

    /// Send `token` to every neighbour of `id` except `skip`
    pub(crate) fn broadcast(
        arena: &mut NodeArena,
        id: NodeId,
        skip: Option<NodeId>,
        token: Token,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<(), ProtocolError> {
        let targets: Vec<NodeId> = arena
            .get(id)?
            .neighbors()
            .iter()
            .copied()
            .filter(|n| Some(*n) != skip)
            .collect();
        for to in targets {
            arena.post(to, token)?;
            sink.log(round, Event::Sent { from: id, to });
        }
        Ok(())
    }
}

impl WaveHooks for WaveEngine {
    fn receive(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<Token, ProtocolError> {
        Self::receive(arena, id, round, sink)
    }

    fn token(&self, node: &NodeState) -> Token {
        Token {
            from: node.id(),
            value: None,
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
        Self::mark_decided(arena, id)?;
        sink.log(
            round,
            Event::Decided {
                node: id,
                decision: Decision::Terminated,
            },
        );
        if self.flood_decision {
            let token = Token { from: id, value: None };
            Self::broadcast(arena, id, last_sender, token, round, sink)?;
        }
        Ok(())
    }
}

/// The wave phase of one activation. Returns true if the node acted; an idle
/// activation is left for the caller to report.
pub(crate) fn wave_step<H: WaveHooks>(
    hooks: &H,
    arena: &mut NodeArena,
    id: NodeId,
    round: Round,
    sink: &mut dyn EventSink,
) -> Result<bool, ProtocolError> {
    let mut acted = false;

    loop {
        let node = arena.get(id)?;
        if node.has_silent() || node.received_all() || !node.has_messages() {
            break;
        }
        hooks.receive(arena, id, round, sink)?;
        acted = true;
    }

    let node = arena.get(id)?;
    if !node.has_silent() {
        return Ok(acted);
    }

    if !node.sent_to_silent() {
        if node.received_all() {
            // no neighbours at all: nothing to wait for
            if !node.is_decided() {
                hooks.decide(arena, id, None, round, sink)?;
                acted = true;
            }
        } else {
            let token = hooks.token(node);
            acted |= WaveEngine::send_to_silent(arena, id, token, round, sink)?;
        }
    }

    if arena.get(id)?.has_messages() {
        let token = hooks.receive(arena, id, round, sink)?;
        hooks.decide(arena, id, Some(token.from), round, sink)?;
        acted = true;
    }

    Ok(acted)
}

/// Reason reported when a node in the wave phase did nothing
pub(crate) fn idle_reason(node: &NodeState) -> NoActionReason {
    if node.has_silent() {
        NoActionReason::Idle
    } else {
        NoActionReason::WaitingForSilent
    }
}

impl Protocol for WaveEngine {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Wave
    }

    fn step(
        &self,
        arena: &mut NodeArena,
        id: NodeId,
        round: Round,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ProtocolError> {
        let acted = wave_step(self, arena, id, round, sink)?;
        if !acted {
            let reason = idle_reason(arena.get(id)?);
            sink.log(round, Event::NoAction { node: id, reason });
        }
        Ok(acted)
    }
}
