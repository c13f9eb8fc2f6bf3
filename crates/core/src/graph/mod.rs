use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    frame::{EnergyTier, GeneratedFrame},
    KineticError, Result,
};

/// A named choreography state.
///
/// The energy range is the band in which the node is *eligible*: an edge in
/// [`transitions_to`](KineticNode::transitions_to) is a possibility, the
/// target's energy range is the permission. `pose_prefixes` and
/// `energy_tags` form the declarative binding table consulted by
/// [`KineticGraph::assign_frames`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KineticNode {
    pub id: String,
    /// Inclusive `[min, max]` audio-energy band, both in `[0, 1]`.
    pub energy_range: (f32, f32),
    /// Directed edges. Declared order is significant: the engine breaks
    /// ties between equally good targets by taking the first one.
    pub transitions_to: Vec<String>,
    /// Pose families whose frames land in this node's pool.
    pub pose_prefixes: Vec<String>,
    /// Energy tags accepted in addition to the pose prefixes, so that
    /// catalogues without a family convention still bind somewhere.
    pub energy_tags: Vec<EnergyTier>,
    /// Frame pool, populated by `assign_frames` after construction.
    #[serde(skip)]
    pub frames: Vec<GeneratedFrame>,
}

impl KineticNode {
    pub fn contains_energy(&self, energy: f32) -> bool {
        energy >= self.energy_range.0 && energy <= self.energy_range.1
    }

    pub fn band_midpoint(&self) -> f32 {
        (self.energy_range.0 + self.energy_range.1) * 0.5
    }

    fn accepts(&self, frame: &GeneratedFrame) -> bool {
        self.pose_prefixes.iter().any(|prefix| prefix == frame.family())
            || self.energy_tags.contains(&frame.energy)
    }
}

/// The choreography transition graph: pose nodes plus the directed
/// adjacency that encodes which moves may follow which.
#[derive(Debug)]
pub struct KineticGraph {
    nodes: Vec<KineticNode>,
    index: HashMap<String, usize>,
}

impl KineticGraph {
    /// Builds the default topology. `idle` can sway into the lean poses or
    /// work up into `groove`, `drop` and `chaos` sit behind high-energy
    /// gates, and there is no direct path from `idle` into `chaos`.
    pub fn new() -> Self {
        let nodes = vec![
            node(
                "idle",
                (0.0, 0.35),
                &["lean_left", "lean_right", "groove"],
                &["idle"],
                &[EnergyTier::Low],
            ),
            node(
                "lean_left",
                (0.0, 0.5),
                &["idle", "lean_right", "groove"],
                &["lean_left"],
                &[],
            ),
            node(
                "lean_right",
                (0.0, 0.5),
                &["idle", "lean_left", "groove"],
                &["lean_right"],
                &[],
            ),
            node(
                "groove",
                (0.3, 0.75),
                &["idle", "lean_left", "step_touch", "drop"],
                &["groove"],
                &[EnergyTier::Mid],
            ),
            node(
                "step_touch",
                (0.35, 0.8),
                &["groove", "drop"],
                &["step_touch"],
                &[],
            ),
            node(
                "drop",
                (0.7, 1.0),
                &["groove", "step_touch", "chaos"],
                &["drop"],
                &[EnergyTier::High],
            ),
            node("chaos", (0.8, 1.0), &["drop", "groove"], &["chaos"], &[]),
        ];

        Self::with_nodes(nodes).expect("default topology must be valid")
    }

    /// Builds a graph from a custom node set, validating that node ids are
    /// unique and that every declared edge points at an existing node.
    pub fn with_nodes(nodes: Vec<KineticNode>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(KineticError::InvalidTopology(format!(
                    "duplicate node id `{}`",
                    node.id
                )));
            }
        }

        for node in &nodes {
            for target in &node.transitions_to {
                if !index.contains_key(target) {
                    return Err(KineticError::InvalidTopology(format!(
                        "node `{}` declares a transition to unknown node `{target}`",
                        node.id
                    )));
                }
            }
        }

        Ok(Self { nodes, index })
    }

    /// Returns every node in declaration order. Diagnostics only; the hot
    /// path goes through `valid_transitions`.
    pub fn all_nodes(&self) -> &[KineticNode] {
        &self.nodes
    }

    /// Looks a node up by id. Absence is not fatal; callers handle `None`.
    pub fn node(&self, id: &str) -> Option<&KineticNode> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    /// Pure topology check: is there a declared edge `from -> to`?
    pub fn can_transition(&self, from: &str, to: &str) -> bool {
        self.node(from)
            .map(|node| node.transitions_to.iter().any(|target| target == to))
            .unwrap_or(false)
    }

    /// The energy-gated legality check the engine actually uses: the subset
    /// of `from`'s edges whose target band contains `energy`, in declared
    /// edge order.
    pub fn valid_transitions(&self, from: &str, energy: f32) -> Vec<&KineticNode> {
        let Some(source) = self.node(from) else {
            return Vec::new();
        };

        source
            .transitions_to
            .iter()
            .filter_map(|target| self.node(target))
            .filter(|target| target.contains_energy(energy))
            .collect()
    }

    /// Rebinds every node's frame pool from the catalogue. Deterministic
    /// and idempotent: pools are fully replaced, never appended to. Frames
    /// that match no node are dropped silently.
    pub fn assign_frames(&mut self, frames: &[GeneratedFrame]) {
        let mut assigned = 0usize;
        for node in &mut self.nodes {
            node.frames = frames
                .iter()
                .filter(|frame| node.accepts(frame))
                .cloned()
                .collect();
            assigned += node.frames.len();
        }

        debug!(
            catalogue = frames.len(),
            assigned, "rebound frame pools across graph"
        );
    }
}

impl Default for KineticGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn node(
    id: &str,
    energy_range: (f32, f32),
    transitions_to: &[&str],
    pose_prefixes: &[&str],
    energy_tags: &[EnergyTier],
) -> KineticNode {
    KineticNode {
        id: id.to_string(),
        energy_range,
        transitions_to: transitions_to.iter().map(|s| s.to_string()).collect(),
        pose_prefixes: pose_prefixes.iter().map(|s| s.to_string()).collect(),
        energy_tags: energy_tags.to_vec(),
        frames: Vec::new(),
    }
}
