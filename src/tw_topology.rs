//! Tree topologies the protocols run on.
//!
//! The protocol engines only ever see an [`Adjacency`]: node ids and their
//! neighbour sets. The builders here produce the tree shapes used by the
//! simulator (arbitrary trees, binary search trees, paths) and render them for
//! the log.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use hashbrown::HashSet;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::tw_config::{TopologyConfig, TopologyKind};
use crate::tw_error::ConfigurationError;
use crate::tw_interface::NodeId;

// ============================================================================
// Adjacency
// ============================================================================

/// Undirected neighbour relation, id -> neighbour set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjacency {
    links: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Adjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a neighbour map as is. Nothing is checked until [`validate`](Self::validate).
    pub fn from_neighbors(links: BTreeMap<NodeId, BTreeSet<NodeId>>) -> Self {
        Self { links }
    }

    /// Build from a node list and undirected edges. Edge endpoints missing
    /// from `ids` are added.
    pub fn from_edges(ids: &[NodeId], edges: &[(NodeId, NodeId)]) -> Self {
        let mut adjacency = Self::new();
        for id in ids {
            adjacency.add_node(*id);
        }
        for (a, b) in edges {
            adjacency.link(*a, *b);
        }
        adjacency
    }

    /// Path `0 - 1 - ... - (n-1)`
    pub fn path(n: usize) -> Self {
        let mut adjacency = Self::new();
        for id in 0..n as NodeId {
            adjacency.add_node(id);
            if id > 0 {
                adjacency.link(id - 1, id);
            }
        }
        adjacency
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.links.entry(id).or_default();
    }

    /// Add the link in both directions
    pub fn link(&mut self, a: NodeId, b: NodeId) {
        self.links.entry(a).or_default().insert(b);
        self.links.entry(b).or_default().insert(a);
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.links.keys().copied()
    }

    pub fn neighbors(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.links.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &BTreeSet<NodeId>)> {
        self.links.iter()
    }

    /// Number of undirected links, counting each direction once
    pub fn link_count(&self) -> usize {
        let directed: usize = self.links.values().map(BTreeSet::len).sum();
        directed / 2
    }

    /// Check that the relation is a symmetric, connected, acyclic graph
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.links.is_empty() {
            return Err(ConfigurationError::InvalidNodeCount(0));
        }

        for (node, neighbors) in &self.links {
            for neighbor in neighbors {
                if neighbor == node {
                    return Err(ConfigurationError::SelfLoop { node: *node });
                }
                match self.links.get(neighbor) {
                    None => {
                        return Err(ConfigurationError::DanglingNeighbor {
                            node: *node,
                            neighbor: *neighbor,
                        })
                    }
                    Some(back) if !back.contains(node) => {
                        return Err(ConfigurationError::AsymmetricLink {
                            a: *node,
                            b: *neighbor,
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        let nodes = self.links.len();
        let links = self.link_count();
        if links != nodes - 1 {
            return Err(ConfigurationError::NotATree { nodes, links });
        }

        // n-1 links and connected means acyclic
        let first = *self.links.keys().next().unwrap_or(&0);
        let (_, _, reached) = self.farthest_from(first);
        if reached != nodes {
            return Err(ConfigurationError::Disconnected { reached, nodes });
        }

        Ok(())
    }

    /// Longest shortest path, in links. Only meaningful on a valid tree.
    pub fn diameter(&self) -> usize {
        let Some(first) = self.links.keys().next() else {
            return 0;
        };
        let (far, _, _) = self.farthest_from(*first);
        let (_, distance, _) = self.farthest_from(far);
        distance
    }

    /// BFS: (farthest node, its distance, number of nodes reached)
    fn farthest_from(&self, start: NodeId) -> (NodeId, usize, usize) {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut queue = VecDeque::new();
        let mut farthest = (start, 0);

        visited.insert(start);
        queue.push_back((start, 0usize));
        while let Some((node, distance)) = queue.pop_front() {
            if distance > farthest.1 {
                farthest = (node, distance);
            }
            for neighbor in self.links.get(&node).into_iter().flatten() {
                if visited.insert(*neighbor) {
                    queue.push_back((*neighbor, distance + 1));
                }
            }
        }

        (farthest.0, farthest.1, visited.len())
    }
}

// ============================================================================
// Arbitrary Tree
// ============================================================================

/// Rooted tree grown level by level with a random fan-out per parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbitraryTree {
    root: NodeId,
    children: BTreeMap<NodeId, Vec<NodeId>>,
}

impl ArbitraryTree {
    /// Grow a tree of `n` nodes with ids `0..n`.
    ///
    /// Every parent of the previous level receives between `min_children` and
    /// `max_children` children while ids remain; when fewer ids remain than
    /// requested the range is cut down to what is left. `max_children` is
    /// clamped to `[1, n]` and `min_children` to at least 1.
    pub fn build<R: Rng>(
        n: usize,
        min_children: usize,
        max_children: usize,
        rng: &mut R,
    ) -> Result<Self, ConfigurationError> {
        if n == 0 {
            return Err(ConfigurationError::InvalidNodeCount(n));
        }
        let max_children = max_children.clamp(1, n);
        let min_children = min_children.max(1);
        if min_children > max_children {
            return Err(ConfigurationError::InvalidChildRange {
                min: min_children,
                max: max_children,
            });
        }

        let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        children.insert(0, Vec::new());
        let mut next_id: usize = 1;
        let mut level: Vec<NodeId> = vec![0];

        while next_id < n {
            let mut next_level = Vec::new();
            for parent in &level {
                if next_id >= n {
                    break;
                }
                let remaining = n - next_id;
                let count = if remaining < min_children {
                    rng.gen_range(1..=remaining)
                } else if remaining < max_children {
                    rng.gen_range(min_children..=remaining)
                } else {
                    rng.gen_range(min_children..=max_children)
                };

                for _ in 0..count {
                    let child = next_id as NodeId;
                    next_id += 1;
                    children.entry(*parent).or_default().push(child);
                    children.insert(child, Vec::new());
                    next_level.push(child);
                }
            }
            level = next_level;
        }

        Ok(Self { root: 0, children })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn adjacency(&self) -> Adjacency {
        let mut adjacency = Adjacency::new();
        for (parent, kids) in &self.children {
            adjacency.add_node(*parent);
            for child in kids {
                adjacency.link(*parent, *child);
            }
        }
        adjacency
    }
}

// ============================================================================
// Binary Search Tree
// ============================================================================

/// Binary search tree keyed by node id; smaller-or-equal ids go left
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryTree {
    root: Option<NodeId>,
    left: BTreeMap<NodeId, NodeId>,
    right: BTreeMap<NodeId, NodeId>,
    nodes: BTreeSet<NodeId>,
}

impl BinaryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert ids in the given order
    pub fn from_sequence<I: IntoIterator<Item = NodeId>>(ids: I) -> Self {
        let mut tree = Self::new();
        for id in ids {
            tree.insert(id);
        }
        tree
    }

    /// Ids `0..n` inserted in random order
    pub fn unbalanced<R: Rng>(n: usize, rng: &mut R) -> Self {
        let mut ids: Vec<NodeId> = (0..n as NodeId).collect();
        ids.shuffle(rng);
        Self::from_sequence(ids)
    }

    /// Ids `0..n` arranged with minimal depth
    pub fn balanced(n: usize) -> Self {
        let mut tree = Self::new();
        let ids: Vec<NodeId> = (0..n as NodeId).collect();
        tree.insert_medians(&ids);
        tree
    }

    /// Returns false if the id is already present
    pub fn insert(&mut self, id: NodeId) -> bool {
        if !self.nodes.insert(id) {
            return false;
        }

        let Some(mut current) = self.root else {
            self.root = Some(id);
            return true;
        };

        loop {
            let side = if id <= current {
                &mut self.left
            } else {
                &mut self.right
            };
            match side.get(&current) {
                Some(next) => current = *next,
                None => {
                    side.insert(current, id);
                    return true;
                }
            }
        }
    }

    /// Rebuild with minimal depth, keeping the same ids
    pub fn balance(&mut self) {
        let ids = self.in_order();
        *self = Self::new();
        self.insert_medians(&ids);
    }

    fn insert_medians(&mut self, sorted: &[NodeId]) {
        if sorted.is_empty() {
            return;
        }
        let mid = sorted.len() / 2;
        self.insert(sorted[mid]);
        self.insert_medians(&sorted[..mid]);
        self.insert_medians(&sorted[mid + 1..]);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.left.get(&id).copied()
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.right.get(&id).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn in_order(&self) -> Vec<NodeId> {
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut current = self.root;
        while current.is_some() || !stack.is_empty() {
            while let Some(id) = current {
                stack.push(id);
                current = self.left(id);
            }
            if let Some(id) = stack.pop() {
                result.push(id);
                current = self.right(id);
            }
        }
        result
    }

    pub fn adjacency(&self) -> Adjacency {
        let mut adjacency = Adjacency::new();
        for id in &self.nodes {
            adjacency.add_node(*id);
        }
        for (parent, child) in self.left.iter().chain(self.right.iter()) {
            adjacency.link(*parent, *child);
        }
        adjacency
    }
}

// ============================================================================
// Topology
// ============================================================================

/// A tree the simulation runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Arbitrary(ArbitraryTree),
    Binary(BinaryTree),
    Explicit(Adjacency),
}

impl Topology {
    /// Build the topology a configuration asks for. Random shapes draw from `rng`.
    pub fn build<R: Rng>(config: &TopologyConfig, rng: &mut R) -> Result<Self, ConfigurationError> {
        let n = config.node_count;
        if n == 0 && config.kind != TopologyKind::Explicit {
            return Err(ConfigurationError::InvalidNodeCount(n));
        }

        let topology = match config.kind {
            TopologyKind::Arbitrary => Topology::Arbitrary(ArbitraryTree::build(
                n,
                config.min_children.unwrap_or(1),
                config.max_children.unwrap_or(n),
                rng,
            )?),
            TopologyKind::BinaryBalanced => Topology::Binary(BinaryTree::balanced(n)),
            TopologyKind::BinaryUnbalanced => Topology::Binary(BinaryTree::unbalanced(n, rng)),
            TopologyKind::Path => Topology::Explicit(Adjacency::path(n)),
            TopologyKind::Explicit => {
                let mut seen = BTreeSet::new();
                for id in &config.ids {
                    if !seen.insert(*id) {
                        return Err(ConfigurationError::DuplicateNode(*id));
                    }
                }
                let edges: Vec<(NodeId, NodeId)> = config.edges.iter().map(|e| (e[0], e[1])).collect();
                Topology::Explicit(Adjacency::from_edges(&config.ids, &edges))
            }
        };

        topology.adjacency().validate()?;
        Ok(topology)
    }

    pub fn adjacency(&self) -> Adjacency {
        match self {
            Topology::Arbitrary(tree) => tree.adjacency(),
            Topology::Binary(tree) => tree.adjacency(),
            Topology::Explicit(adjacency) => adjacency.clone(),
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Topology::Arbitrary(tree) => tree.len(),
            Topology::Binary(tree) => tree.len(),
            Topology::Explicit(adjacency) => adjacency.len(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Topology::Arbitrary(_) => "arbitrary",
            Topology::Binary(_) => "binary",
            Topology::Explicit(_) => "explicit",
        }
    }

    /// Root and ordered child lists. Explicit graphs are rooted at their
    /// smallest id.
    fn rooted(&self) -> Option<(NodeId, BTreeMap<NodeId, Vec<NodeId>>)> {
        match self {
            Topology::Arbitrary(tree) => Some((tree.root, tree.children.clone())),
            Topology::Binary(tree) => {
                let root = tree.root?;
                let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
                for id in &tree.nodes {
                    let kids = children.entry(*id).or_default();
                    kids.extend(tree.left(*id));
                    kids.extend(tree.right(*id));
                }
                Some((root, children))
            }
            Topology::Explicit(adjacency) => {
                let root = adjacency.ids().next()?;
                let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
                let mut visited: HashSet<NodeId> = HashSet::new();
                let mut queue = VecDeque::from([root]);
                visited.insert(root);
                while let Some(node) = queue.pop_front() {
                    let kids = children.entry(node).or_default();
                    for neighbor in adjacency.neighbors(node).into_iter().flatten() {
                        if visited.insert(*neighbor) {
                            kids.push(*neighbor);
                            queue.push_back(*neighbor);
                        }
                    }
                }
                Some((root, children))
            }
        }
    }

    /// Number of nodes on each level, root level first
    pub fn levels_population(&self) -> Vec<usize> {
        let Some((root, children)) = self.rooted() else {
            return Vec::new();
        };
        let mut population = Vec::new();
        let mut level = vec![root];
        while !level.is_empty() {
            population.push(level.len());
            level = level
                .iter()
                .flat_map(|id| children.get(id).into_iter().flatten().copied())
                .collect();
        }
        population
    }

    /// Number of levels; a lone root has depth 1
    pub fn depth(&self) -> usize {
        self.levels_population().len()
    }
}

impl fmt::Display for Topology {
    /// Pre-order listing, one `*` per level below the root
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tree Size {}", self.node_count())?;
        let Some((root, children)) = self.rooted() else {
            return Ok(());
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            writeln!(f, "{}{}", "*".repeat(depth), id)?;
            if let Some(kids) = children.get(&id) {
                for kid in kids.iter().rev() {
                    stack.push((*kid, depth + 1));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_path_is_valid_tree() {
        let path = Adjacency::path(5);
        assert_eq!(path.len(), 5);
        assert_eq!(path.link_count(), 4);
        assert!(path.validate().is_ok());
        assert_eq!(path.diameter(), 4);
    }

    #[test]
    fn test_single_node_is_valid() {
        let single = Adjacency::from_edges(&[7], &[]);
        assert!(single.validate().is_ok());
        assert_eq!(single.diameter(), 0);
    }

    #[test]
    fn test_validate_rejects_malformed_graphs() {
        assert_eq!(
            Adjacency::new().validate(),
            Err(ConfigurationError::InvalidNodeCount(0))
        );

        // cycle 0-1-2-0
        let cycle = Adjacency::from_edges(&[], &[(0, 1), (1, 2), (2, 0)]);
        assert_eq!(
            cycle.validate(),
            Err(ConfigurationError::NotATree { nodes: 3, links: 3 })
        );

        // two components, one with a cycle: 4 nodes, 3 links
        let split = Adjacency::from_edges(&[0, 1, 2, 3], &[(1, 2), (2, 3), (3, 1)]);
        assert_eq!(
            split.validate(),
            Err(ConfigurationError::Disconnected { reached: 1, nodes: 4 })
        );

        let mut raw = BTreeMap::new();
        raw.insert(0, BTreeSet::from([1]));
        raw.insert(1, BTreeSet::new());
        assert_eq!(
            Adjacency::from_neighbors(raw).validate(),
            Err(ConfigurationError::AsymmetricLink { a: 0, b: 1 })
        );

        let mut raw = BTreeMap::new();
        raw.insert(0, BTreeSet::from([0]));
        assert_eq!(
            Adjacency::from_neighbors(raw).validate(),
            Err(ConfigurationError::SelfLoop { node: 0 })
        );

        let mut raw = BTreeMap::new();
        raw.insert(0, BTreeSet::from([9]));
        assert_eq!(
            Adjacency::from_neighbors(raw).validate(),
            Err(ConfigurationError::DanglingNeighbor { node: 0, neighbor: 9 })
        );
    }

    #[test]
    fn test_arbitrary_tree_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..40 {
            let tree = ArbitraryTree::build(n, 1, n, &mut rng).unwrap();
            assert_eq!(tree.len(), n);
            let adjacency = tree.adjacency();
            assert!(adjacency.validate().is_ok(), "n = {}", n);
        }
    }

    #[test]
    fn test_arbitrary_tree_respects_fan_out() {
        let mut rng = StdRng::seed_from_u64(11);
        let tree = ArbitraryTree::build(50, 2, 3, &mut rng).unwrap();
        for id in 0..50 {
            assert!(tree.children(id).len() <= 3);
        }
        assert!(ArbitraryTree::build(10, 4, 2, &mut rng).is_err());
    }

    #[test]
    fn test_binary_tree_insert_and_order() {
        let tree = BinaryTree::from_sequence([6, 2, 5, 7, 1, 3, 4, 9, 8]);
        assert_eq!(tree.root(), Some(6));
        assert_eq!(tree.left(6), Some(2));
        assert_eq!(tree.right(6), Some(7));
        assert_eq!(tree.in_order(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert!(tree.adjacency().validate().is_ok());
    }

    #[test]
    fn test_balanced_binary_tree() {
        let tree = BinaryTree::balanced(7);
        assert_eq!(tree.root(), Some(3));
        assert_eq!(tree.left(3), Some(1));
        assert_eq!(tree.right(3), Some(5));

        let topology = Topology::Binary(tree);
        assert_eq!(topology.levels_population(), vec![1, 2, 4]);
        assert_eq!(topology.depth(), 3);
        assert_eq!(topology.adjacency().diameter(), 4);
    }

    #[test]
    fn test_balance_keeps_ids() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut tree = BinaryTree::unbalanced(20, &mut rng);
        let before = tree.in_order();
        tree.balance();
        assert_eq!(tree.in_order(), before);
        assert_eq!(Topology::Binary(tree).depth(), 5);
    }

    #[test]
    fn test_render() {
        let topology = Topology::Binary(BinaryTree::balanced(3));
        assert_eq!(topology.to_string(), "Tree Size 3\n1\n*0\n*2\n");
    }

    #[test]
    fn test_build_from_config() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = TopologyConfig {
            kind: TopologyKind::Explicit,
            ids: vec![5, 2, 9],
            edges: vec![[5, 2], [2, 9]],
            ..Default::default()
        };
        let topology = Topology::build(&config, &mut rng).unwrap();
        assert_eq!(topology.node_count(), 3);
        assert_eq!(
            topology.adjacency().neighbors(2),
            Some(&BTreeSet::from([5, 9]))
        );

        let config = TopologyConfig {
            kind: TopologyKind::Arbitrary,
            node_count: 0,
            ..Default::default()
        };
        assert_eq!(
            Topology::build(&config, &mut rng),
            Err(ConfigurationError::InvalidNodeCount(0))
        );
    }
}
