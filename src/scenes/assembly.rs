use std::collections::HashMap;

use glam::Quat;
use serde::{Deserialize, Serialize};

use crate::animation::{Spring, SpringParams};
use crate::core::{Accumulator, Countdown};
use crate::scene::{NodeKey, SceneGraph};

/// What a named node is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Structural body; the open animation rotates it
    Frame,
    /// Receives the screen texture
    Screen,
    Logo,
    Decorative,
    /// Interior only shown by the cutaway preset
    Cutaway,
}

impl Role {
    pub fn default_visible(&self) -> bool {
        !matches!(self, Role::Cutaway)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub node: String,
    pub role: Role,
}

/// Role table resolved against a loaded graph, built once
#[derive(Debug, Clone, Default)]
pub struct RoleIndex {
    by_name: HashMap<String, NodeKey>,
    by_role: HashMap<Role, Vec<NodeKey>>,
    roles: Vec<(NodeKey, Role)>,
}

impl RoleIndex {
    /// Look each table entry up by name; entries naming missing nodes are
    /// skipped
    pub fn build(graph: &SceneGraph, table: &[RoleEntry]) -> Self {
        let mut index = Self::default();
        for entry in table {
            let Some(key) = graph.find(&entry.node) else {
                log::debug!("role table names missing node {:?}", entry.node);
                continue;
            };
            index.by_name.insert(entry.node.clone(), key);
            index.by_role.entry(entry.role).or_default().push(key);
            index.roles.push((key, entry.role));
        }
        log::debug!("role index: {} of {} entries resolved", index.roles.len(), table.len());
        index
    }

    pub fn key(&self, name: &str) -> Option<NodeKey> {
        self.by_name.get(name).copied()
    }

    pub fn nodes(&self, role: Role) -> &[NodeKey] {
        self.by_role.get(&role).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn first(&self, role: Role) -> Option<NodeKey> {
        self.nodes(role).first().copied()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn apply_default_visibility(&self, graph: &mut SceneGraph) {
        for (key, role) in &self.roles {
            graph.set_visible(*key, role.default_visible());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAnimationConfig {
    /// Node rotated about its local X axis
    pub node: String,
    /// Wait after loading before the motion starts
    pub delay_ms: u64,
    pub from_degrees: f32,
    pub to_degrees: f32,
    pub spring: SpringParams,
}

impl Default for OpenAnimationConfig {
    fn default() -> Self {
        Self {
            node: "Frame".to_string(),
            delay_ms: 600,
            from_degrees: 90.0,
            to_degrees: 0.0,
            spring: SpringParams::default(),
        }
    }
}

const OPEN_STEP_HZ: f32 = 120.0;
/// Degrees; closer than this the pose snaps to the end
const OPEN_SETTLE: f32 = 1e-3;

/// One-shot lid motion from `from_degrees` to `to_degrees`
#[derive(Debug, Clone)]
pub struct OpenAnimation {
    node: NodeKey,
    base: Quat,
    delay: Countdown,
    angle: Spring,
    end: f32,
    stepper: Accumulator,
    finished: bool,
}

impl OpenAnimation {
    /// Pose the node at the start angle and begin the delay
    ///
    /// Under reduced motion the end pose is set immediately.
    pub fn start(graph: &mut SceneGraph, node: NodeKey, config: &OpenAnimationConfig, reduced_motion: bool) -> Self {
        let base = graph
            .node(node)
            .map(|node| node.transform.rotation)
            .unwrap_or(Quat::IDENTITY);
        let mut delay = Countdown::new(config.delay_ms as f32 / 1000.0);
        delay.start();

        let mut animation = Self {
            node,
            base,
            delay,
            angle: Spring::new(config.from_degrees, config.spring),
            end: config.to_degrees,
            stepper: Accumulator::new(OPEN_STEP_HZ, 8),
            finished: false,
        };
        if reduced_motion {
            animation.finish(graph);
        } else {
            animation.pose(graph);
        }
        animation
    }

    pub fn angle(&self) -> f32 {
        self.angle.value()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn update(&mut self, delta: f32, graph: &mut SceneGraph) {
        if self.finished {
            return;
        }
        if self.delay.is_active() {
            if self.delay.tick(delta) {
                self.angle.set_target(self.end);
            }
            return;
        }

        for dt in self.stepper.tick(delta) {
            self.angle.step(dt);
        }
        if self.angle.is_settled(OPEN_SETTLE) {
            self.finish(graph);
        } else {
            self.pose(graph);
        }
    }

    /// Jump to the end pose
    pub fn finish(&mut self, graph: &mut SceneGraph) {
        self.delay.cancel();
        self.angle.snap(self.end);
        self.finished = true;
        self.pose(graph);
    }

    fn pose(&self, graph: &mut SceneGraph) {
        if let Some(node) = graph.node_mut(self.node) {
            node.transform.rotation = self.base * Quat::from_rotation_x(self.angle.value().to_radians());
        }
    }
}
