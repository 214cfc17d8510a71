//! Per-node protocol state and the arena that owns it.
//!
//! Nodes never hold references to each other. Everything is addressed by
//! [`NodeId`] through [`NodeArena`], and the only writes one node may make to
//! another are the two mailbox pushes [`NodeArena::post`] and
//! [`NodeArena::post_wakeup`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use indexmap::IndexMap;

use crate::tw_error::ProtocolError;
use crate::tw_interface::{NodeId, Outcome, Token, Value, WaveState, INFINITY};
use crate::tw_topology::Adjacency;

/// Election-specific state, present only when the node runs the election
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionExtension {
    pub(crate) value: Value,
    pub(crate) initiator: bool,
    pub(crate) wake_sent: bool,
    pub(crate) wake_received: usize,
    pub(crate) wake_inbox: VecDeque<NodeId>,
    pub(crate) outcome: Outcome,
}

impl Default for ElectionExtension {
    fn default() -> Self {
        Self {
            value: INFINITY,
            initiator: false,
            wake_sent: false,
            wake_received: 0,
            wake_inbox: VecDeque::new(),
            outcome: Outcome::Sleeping,
        }
    }
}

impl ElectionExtension {
    pub fn value(&self) -> Value {
        self.value
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn wake_sent(&self) -> bool {
        self.wake_sent
    }

    pub fn wake_received(&self) -> usize {
        self.wake_received
    }

    pub fn pending_wakeups(&self) -> usize {
        self.wake_inbox.len()
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    id: NodeId,
    neighbors: BTreeSet<NodeId>,
    // has this neighbour's token been received
    pub(crate) acked: IndexMap<NodeId, bool>,
    pub(crate) inbox: VecDeque<Token>,
    pub(crate) sent_to_silent: bool,
    pub(crate) state: WaveState,
    pub(crate) election: Option<ElectionExtension>,
}

impl NodeState {
    pub fn new(id: NodeId, neighbors: BTreeSet<NodeId>) -> Self {
        let acked = neighbors.iter().map(|n| (*n, false)).collect();
        Self {
            id,
            neighbors,
            acked,
            inbox: VecDeque::new(),
            sent_to_silent: false,
            state: WaveState::Active,
            election: None,
        }
    }

    pub fn with_election(id: NodeId, neighbors: BTreeSet<NodeId>) -> Self {
        let mut node = Self::new(id, neighbors);
        node.election = Some(ElectionExtension::default());
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    pub fn is_acked(&self, neighbor: NodeId) -> bool {
        self.acked.get(&neighbor).copied().unwrap_or(false)
    }

    /// Neighbours whose token has not arrived yet
    pub fn unacked_count(&self) -> usize {
        self.acked.values().filter(|acked| !**acked).count()
    }

    /// At most one neighbour is still silent
    pub fn has_silent(&self) -> bool {
        self.unacked_count() <= 1
    }

    pub fn received_all(&self) -> bool {
        self.acked.values().all(|acked| *acked)
    }

    /// The single neighbour that has not sent its token
    pub fn silent_neighbor(&self) -> Result<NodeId, ProtocolError> {
        let mut silent = self.acked.iter().filter(|(_, acked)| !**acked).map(|(id, _)| *id);
        match (silent.next(), silent.next()) {
            (Some(id), None) => Ok(id),
            _ => Err(ProtocolError::NoSilentNeighbor { node: self.id }),
        }
    }

    pub fn has_messages(&self) -> bool {
        !self.inbox.is_empty()
    }

    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }

    pub fn sent_to_silent(&self) -> bool {
        self.sent_to_silent
    }

    pub fn state(&self) -> WaveState {
        self.state
    }

    pub fn is_decided(&self) -> bool {
        self.state == WaveState::Decided
    }

    pub fn election(&self) -> Option<&ElectionExtension> {
        self.election.as_ref()
    }

    pub(crate) fn election_mut(&mut self) -> Result<&mut ElectionExtension, ProtocolError> {
        let id = self.id;
        self.election
            .as_mut()
            .ok_or(ProtocolError::NotAnElectionNode(id))
    }

    /// Election value, `None` for plain wave nodes
    pub fn value(&self) -> Option<Value> {
        self.election.as_ref().map(|e| e.value)
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.election.as_ref().map(|e| e.outcome)
    }
}

// ============================================================================
// Node Arena
// ============================================================================

/// Owns every node of a run, addressed by id
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: BTreeMap<NodeId, NodeState>,
}

impl NodeArena {
    /// Plain wave nodes for every id of the topology
    pub fn for_wave(adjacency: &Adjacency) -> Self {
        Self::build(adjacency, NodeState::new)
    }

    /// Election nodes (wave state plus election extension)
    pub fn for_election(adjacency: &Adjacency) -> Self {
        Self::build(adjacency, NodeState::with_election)
    }

    fn build(adjacency: &Adjacency, make: fn(NodeId, BTreeSet<NodeId>) -> NodeState) -> Self {
        let nodes = adjacency
            .iter()
            .map(|(id, neighbors)| (*id, make(*id, neighbors.clone())))
            .collect();
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids in ascending order
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.values()
    }

    pub fn get(&self, id: NodeId) -> Result<&NodeState, ProtocolError> {
        self.nodes.get(&id).ok_or(ProtocolError::UnknownNode(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeState, ProtocolError> {
        self.nodes.get_mut(&id).ok_or(ProtocolError::UnknownNode(id))
    }

    /// Deliver a token into `to`'s inbox
    pub(crate) fn post(&mut self, to: NodeId, token: Token) -> Result<(), ProtocolError> {
        self.get_mut(to)?.inbox.push_back(token);
        Ok(())
    }

    /// Deliver a wake-up from `from` into `to`'s wake inbox
    pub(crate) fn post_wakeup(&mut self, to: NodeId, from: NodeId) -> Result<(), ProtocolError> {
        self.get_mut(to)?.election_mut()?.wake_inbox.push_back(from);
        Ok(())
    }

    /// Mark `id` as an election initiator: value becomes its own id
    pub fn make_initiator(&mut self, id: NodeId) -> Result<(), ProtocolError> {
        let election = self.get_mut(id)?.election_mut()?;
        election.initiator = true;
        election.value = id;
        if election.outcome == Outcome::Sleeping {
            election.outcome = Outcome::Waiting;
        }
        Ok(())
    }

    pub fn all_decided(&self) -> bool {
        self.nodes.values().all(NodeState::is_decided)
    }

    pub fn decided_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_decided()).count()
    }

    /// Nodes whose election outcome is `Leader`
    pub fn leaders(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.outcome() == Some(Outcome::Leader))
            .map(NodeState::id)
            .collect()
    }

    /// Total tokens waiting in inboxes
    pub fn in_flight(&self) -> usize {
        self.nodes.values().map(NodeState::pending_messages).sum()
    }
}
