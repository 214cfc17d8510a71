// Simulation Configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tw_error::{ConfigurationError, SimError};
use crate::tw_interface::{Algorithm, NodeId, ITERATION_FACTOR};

/// Main simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub algorithm: Algorithm,
    pub topology: TopologyConfig,
    /// Forward every event (true) or only rounds where something changed
    pub verbose_log: bool,
    pub seed: Option<u64>,
    /// Round budget is `node_count * iteration_factor`
    pub iteration_factor: u64,
    /// Stop as soon as every node has decided
    pub early_exit: bool,
    pub activation: ActivationPolicy,
    pub initiators: InitiatorPolicy,
    /// Plain wave only: deciding nodes pass the decision on to the rest of the tree
    pub flood_wave_decision: bool,
}

/// Tree shape to simulate on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub kind: TopologyKind,
    /// Ignored for `Explicit`, which takes its nodes from `ids` and `edges`
    pub node_count: usize,
    /// Arbitrary trees only
    pub min_children: Option<usize>,
    /// Arbitrary trees only, defaults to `node_count`
    pub max_children: Option<usize>,
    /// Explicit topology: node ids (isolated nodes must be listed here)
    pub ids: Vec<NodeId>,
    /// Explicit topology: undirected links
    pub edges: Vec<[NodeId; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Arbitrary,
    BinaryBalanced,
    BinaryUnbalanced,
    Path,
    Explicit,
}

/// Which nodes get a step in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Between 1 and n-1 distinct nodes, sampled uniformly
    RandomSubset,
    /// Every node, in id order
    Everyone,
}

/// Which nodes start the election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiatorPolicy {
    /// A random non-empty proper subset (the only node if there is one)
    Random,
    All,
    Explicit(Vec<NodeId>),
}

// ============================================================================
// Default Configurations
// ============================================================================

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Election,
            topology: TopologyConfig::default(),
            verbose_log: false,
            seed: None,
            iteration_factor: ITERATION_FACTOR,
            early_exit: false,
            activation: ActivationPolicy::RandomSubset,
            initiators: InitiatorPolicy::Random,
            flood_wave_decision: true,
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            kind: TopologyKind::Arbitrary,
            node_count: 7,
            min_children: None,
            max_children: None,
            ids: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Load from a YAML document; missing keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self, SimError> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Checks that do not need the topology built
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.iteration_factor == 0 {
            return Err(ConfigurationError::InvalidIterationFactor);
        }
        if self.topology.kind != TopologyKind::Explicit && self.topology.node_count == 0 {
            return Err(ConfigurationError::InvalidNodeCount(0));
        }
        if let InitiatorPolicy::Explicit(ids) = &self.initiators {
            if ids.is_empty() {
                return Err(ConfigurationError::NoInitiators);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimConfig::default();
        assert_eq!(config.iteration_factor, 100);
        assert!(!config.early_exit);
        assert_eq!(config.activation, ActivationPolicy::RandomSubset);
        assert_eq!(config.initiators, InitiatorPolicy::Random);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
algorithm: wave
seed: 42
topology:
  kind: binary_balanced
  node_count: 15
initiators:
  explicit: [3, 4]
"#;
        let config = SimConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.algorithm, Algorithm::Wave);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.topology.kind, TopologyKind::BinaryBalanced);
        assert_eq!(config.topology.node_count, 15);
        assert_eq!(config.initiators, InitiatorPolicy::Explicit(vec![3, 4]));
        assert!(config.flood_wave_decision);
    }

    #[test]
    fn test_from_yaml_explicit_edges() {
        let yaml = r#"
topology:
  kind: explicit
  ids: [5, 2, 9]
  edges: [[5, 2], [2, 9]]
"#;
        let config = SimConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.topology.edges, vec![[5, 2], [2, 9]]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SimConfig {
            iteration_factor: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::InvalidIterationFactor)
        );

        let config = SimConfig {
            initiators: InitiatorPolicy::Explicit(vec![]),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigurationError::NoInitiators));

        let yaml = "topology:\n  node_count: 0\n";
        assert!(matches!(
            SimConfig::from_yaml(yaml),
            Err(SimError::Configuration(ConfigurationError::InvalidNodeCount(0)))
        ));
    }
}
