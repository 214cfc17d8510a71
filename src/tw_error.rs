//! Error types for the simulator
//!
//! Configuration errors are raised before the first round. Protocol errors are
//! contract violations inside a step; they always propagate out of the run.

use thiserror::Error;

use crate::tw_interface::NodeId;

/// Rejected before the simulation starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid node count: {0}")]
    InvalidNodeCount(usize),

    #[error("iteration factor must be positive")]
    InvalidIterationFactor,

    #[error("node {node} lists itself as a neighbour")]
    SelfLoop { node: NodeId },

    #[error("node {node} lists unknown neighbour {neighbor}")]
    DanglingNeighbor { node: NodeId, neighbor: NodeId },

    #[error("link {a} -> {b} has no reverse link")]
    AsymmetricLink { a: NodeId, b: NodeId },

    #[error("topology is not a tree: {nodes} nodes but {links} links")]
    NotATree { nodes: usize, links: usize },

    #[error("topology is disconnected: {reached} of {nodes} nodes reachable")]
    Disconnected { reached: usize, nodes: usize },

    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),

    #[error("initiator set is empty")]
    NoInitiators,

    #[error("initiator {0} is not part of the topology")]
    UnknownInitiator(NodeId),

    #[error("min_children ({min}) exceeds max_children ({max})")]
    InvalidChildRange { min: usize, max: usize },
}

/// Contract violation inside a protocol step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("node {node} has no silent neighbour")]
    NoSilentNeighbor { node: NodeId },

    #[error("node {node} attempted to decide twice")]
    RedundantDecision { node: NodeId },

    #[error("node {node} has no pending message")]
    EmptyInbox { node: NodeId },

    #[error("node {node} has no pending wake-up")]
    EmptyWakeupInbox { node: NodeId },

    #[error("node {node} already received a wake-up from every neighbour")]
    WakeupOverflow { node: NodeId },

    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("node {node} received a token from non-neighbour {from}")]
    UnknownNeighbor { node: NodeId, from: NodeId },

    #[error("node {0} carries no election state")]
    NotAnElectionNode(NodeId),
}

/// Anything that can stop a simulation run
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_yaml::Error),
}
