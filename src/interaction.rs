//! Pointer-driven motion and click presets
//!
//! [`PointerTilt`] turns hover position into two spring-damped rotation
//! angles. Springs are stepped from the render loop at a fixed timestep, so
//! pointer events only move targets. [`PresetToggle`] swaps named-node
//! visibility and camera position in one call. [`OrbitControls`] is the
//! drag-to-rotate camera used by the globe.

use std::collections::BTreeMap;
use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::animation::{Spring, SpringParams};
use crate::core::{Accumulator, PointerSource, Throttled};
use crate::scene::{NodeKey, SceneGraph};

/// Spring integration rate
const SPRING_HZ: f32 = 120.0;
/// Most spring steps run in one frame; longer stalls are dropped
const MAX_SPRING_STEPS: u8 = 8;
const SETTLE_EPSILON: f32 = 1e-4;

/// Pointer offset from the viewport center, normalized and halved
///
/// Corners map to ±0.25 on each axis.
pub fn pointer_target(x: f32, y: f32, width: f32, height: f32) -> Vec2 {
    let (width, height) = (width.max(1.0), height.max(1.0));
    Vec2::new(
        (x - width / 2.0) / width / 2.0,
        (y - height / 2.0) / height / 2.0,
    )
}

/// Spring-smoothed rotation following the pointer
pub struct PointerTilt {
    rotation_x: Spring,
    rotation_y: Spring,
    throttle: Throttled<Vec2>,
    stepper: Accumulator,
    pointer: Box<dyn PointerSource>,
    visible: bool,
    reduced_motion: bool,
}

impl PointerTilt {
    pub fn new(
        params: SpringParams,
        throttle_seconds: f32,
        pointer: Box<dyn PointerSource>,
        reduced_motion: bool,
    ) -> Self {
        let mut tilt = Self {
            rotation_x: Spring::new(0.0, params),
            rotation_y: Spring::new(0.0, params),
            throttle: Throttled::new(throttle_seconds),
            stepper: Accumulator::new(SPRING_HZ, MAX_SPRING_STEPS),
            pointer,
            visible: true,
            reduced_motion,
        };
        tilt.sync_listener();
        tilt
    }

    /// Current rotation in radians: `x` about the X axis, `y` about Y
    pub fn rotation(&self) -> Vec2 {
        Vec2::new(self.rotation_x.value(), self.rotation_y.value())
    }

    pub fn target(&self) -> Vec2 {
        Vec2::new(self.rotation_x.target(), self.rotation_y.target())
    }

    pub fn is_listening(&self) -> bool {
        self.pointer.is_attached()
    }

    pub fn is_settled(&self) -> bool {
        self.rotation_x.is_settled(SETTLE_EPSILON) && self.rotation_y.is_settled(SETTLE_EPSILON)
    }

    /// Feed a pointer position in canvas pixels
    ///
    /// Returns true when the move passed the throttle and changed the
    /// targets. Ignored while not listening.
    pub fn on_pointer_move(&mut self, x: f32, y: f32, canvas: (u32, u32)) -> bool {
        if !self.is_listening() {
            return false;
        }
        let target = pointer_target(x, y, canvas.0 as f32, canvas.1 as f32);
        match self.throttle.offer(target) {
            Some(target) => {
                self.aim(target);
                true
            }
            None => false,
        }
    }

    fn aim(&mut self, target: Vec2) {
        // Horizontal offset turns about Y, vertical about X
        self.rotation_y.set_target(target.x);
        self.rotation_x.set_target(target.y);
    }

    /// Deliver any trailing pointer value and step the springs
    pub fn update(&mut self, delta: f32) {
        if let Some(target) = self.throttle.advance(delta) {
            if self.is_listening() {
                self.aim(target);
            }
        }
        for dt in self.stepper.tick(delta) {
            self.rotation_x.step(dt);
            self.rotation_y.step(dt);
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.sync_listener();
    }

    pub fn set_reduced_motion(&mut self, reduced_motion: bool) {
        self.reduced_motion = reduced_motion;
        self.sync_listener();
    }

    fn sync_listener(&mut self) {
        let listen = self.visible && !self.reduced_motion;
        if listen == self.pointer.is_attached() {
            return;
        }
        if listen {
            self.pointer.attach();
        } else {
            self.pointer.detach();
            self.throttle.clear();
            self.stepper.reset();
            self.rotation_x.hold();
            self.rotation_y.hold();
        }
    }
}

impl std::fmt::Debug for PointerTilt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerTilt")
            .field("rotation", &self.rotation())
            .field("target", &self.target())
            .field("listening", &self.is_listening())
            .finish()
    }
}

// === Presets ===

/// Named-node visibility plus a camera position, as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetConfig {
    pub visibility: BTreeMap<String, bool>,
    pub camera_position: [f32; 3],
}

/// The two presets a click alternates between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetPair {
    pub full: PresetConfig,
    pub cutaway: PresetConfig,
}

/// Preset resolved against a loaded graph
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub visibility: Vec<(NodeKey, bool)>,
    pub camera_position: Vec3,
}

impl Preset {
    /// Resolve node names once; names missing from the graph are dropped
    pub fn resolve(name: &'static str, config: &PresetConfig, graph: &SceneGraph) -> Self {
        let visibility = config
            .visibility
            .iter()
            .filter_map(|(node, visible)| match graph.find(node) {
                Some(key) => Some((key, *visible)),
                None => {
                    log::debug!("preset {} names missing node {:?}", name, node);
                    None
                }
            })
            .collect();
        Self {
            name,
            visibility,
            camera_position: Vec3::from(config.camera_position),
        }
    }

    fn apply(&self, graph: &mut SceneGraph) {
        for (key, visible) in &self.visibility {
            graph.set_visible(*key, *visible);
        }
    }
}

/// Full / cutaway switch
#[derive(Debug, Clone)]
pub struct PresetToggle {
    full: Preset,
    cutaway: Preset,
    cutaway_active: bool,
}

impl PresetToggle {
    pub fn resolve(pair: &PresetPair, graph: &SceneGraph) -> Self {
        Self {
            full: Preset::resolve("full", &pair.full, graph),
            cutaway: Preset::resolve("cutaway", &pair.cutaway, graph),
            cutaway_active: false,
        }
    }

    pub fn is_cutaway(&self) -> bool {
        self.cutaway_active
    }

    pub fn active(&self) -> &Preset {
        if self.cutaway_active {
            &self.cutaway
        } else {
            &self.full
        }
    }

    /// Switch to the other preset and apply every visibility change;
    /// returns the camera position the caller must set in the same step
    pub fn toggle(&mut self, graph: &mut SceneGraph) -> Vec3 {
        self.cutaway_active = !self.cutaway_active;
        let preset = self.active();
        preset.apply(graph);
        log::debug!("preset -> {}", preset.name);
        preset.camera_position
    }
}

// === Orbit controls ===

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    /// Fraction of angular velocity lost per 1/60 s
    pub damping: f32,
    pub rotate_speed: f32,
    /// Polar limits in degrees from +Y
    pub min_polar_degrees: f32,
    pub max_polar_degrees: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            damping: 0.08,
            rotate_speed: 0.6,
            min_polar_degrees: 30.0,
            max_polar_degrees: 120.0,
        }
    }
}

/// Drag-to-orbit camera around a fixed target
#[derive(Debug, Clone)]
pub struct OrbitControls {
    target: Vec3,
    distance: f32,
    azimuth: f32,
    polar: f32,
    velocity: Vec2,
    config: OrbitConfig,
    damping_enabled: bool,
    stepper: Accumulator,
}

impl OrbitControls {
    pub fn new(position: Vec3, target: Vec3, config: OrbitConfig) -> Self {
        let mut controls = Self {
            target,
            distance: 1.0,
            azimuth: 0.0,
            polar: PI / 2.0,
            velocity: Vec2::ZERO,
            config,
            damping_enabled: true,
            stepper: Accumulator::new(SPRING_HZ, MAX_SPRING_STEPS),
        };
        controls.set_position(position);
        controls
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Jump to `position`, keeping the target; motion stops
    pub fn set_position(&mut self, position: Vec3) {
        let offset = position - self.target;
        self.distance = offset.length().max(f32::EPSILON);
        self.azimuth = offset.x.atan2(offset.z);
        self.polar = (offset.y / self.distance).clamp(-1.0, 1.0).acos();
        self.velocity = Vec2::ZERO;
        self.clamp_polar();
    }

    /// Under reduced motion drags apply immediately with no glide
    pub fn set_damping_enabled(&mut self, enabled: bool) {
        self.damping_enabled = enabled;
        if !enabled {
            self.velocity = Vec2::ZERO;
        }
    }

    pub fn is_moving(&self) -> bool {
        self.velocity.length_squared() > SETTLE_EPSILON * SETTLE_EPSILON
    }

    /// Rotate by a drag of (`dx`, `dy`) pixels on a viewport `height` tall
    pub fn drag(&mut self, dx: f32, dy: f32, height: f32) {
        let scale = 2.0 * PI * self.config.rotate_speed / height.max(1.0);
        let delta = Vec2::new(-dx * scale, -dy * scale);
        if self.damping_enabled {
            self.velocity += delta;
        } else {
            self.azimuth += delta.x;
            self.polar += delta.y;
            self.clamp_polar();
        }
    }

    /// Integrate damped angular velocity at the fixed spring rate
    ///
    /// Damping is expressed per 1/60 s, so each fixed step advances and
    /// decays by its share of that reference frame.
    pub fn update(&mut self, delta: f32) {
        if !self.damping_enabled || self.velocity == Vec2::ZERO {
            self.stepper.reset();
            return;
        }
        let damping = self.config.damping.clamp(0.0, 1.0);
        for step in self.stepper.tick(delta) {
            let frames = step * 60.0;
            self.azimuth += self.velocity.x * damping * frames;
            self.polar += self.velocity.y * damping * frames;
            self.clamp_polar();
            self.velocity *= (1.0 - damping).powf(frames);
        }

        if !self.is_moving() {
            self.velocity = Vec2::ZERO;
        }
    }

    fn clamp_polar(&mut self) {
        let min = self.config.min_polar_degrees.to_radians();
        let max = self.config.max_polar_degrees.to_radians().max(min);
        self.polar = self.polar.clamp(min, max);
    }

    /// Camera position on the orbit sphere
    pub fn position(&self) -> Vec3 {
        let (sin_polar, cos_polar) = self.polar.sin_cos();
        let (sin_azimuth, cos_azimuth) = self.azimuth.sin_cos();
        self.target + self.distance * Vec3::new(sin_polar * sin_azimuth, cos_polar, sin_polar * cos_azimuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PointerGate;
    use crate::scene::Node;

    fn tilt(reduced_motion: bool) -> (PointerTilt, PointerGate) {
        let gate = PointerGate::new();
        let tilt = PointerTilt::new(SpringParams::default(), 0.1, Box::new(gate.clone()), reduced_motion);
        (tilt, gate)
    }

    #[test]
    fn test_pointer_target_is_halved_offset() {
        assert_eq!(pointer_target(50.0, 50.0, 100.0, 100.0), Vec2::ZERO);
        assert_eq!(pointer_target(100.0, 0.0, 100.0, 100.0), Vec2::new(0.25, -0.25));
        assert_eq!(pointer_target(0.0, 100.0, 200.0, 100.0), Vec2::new(-0.25, 0.25));
    }

    #[test]
    fn test_springs_follow_pointer() {
        let (mut tilt, _) = tilt(false);
        assert!(tilt.on_pointer_move(100.0, 50.0, (100, 100)));

        for _ in 0..240 {
            tilt.update(1.0 / 60.0);
        }
        let rotation = tilt.rotation();
        assert!((rotation.y - 0.25).abs() < 1e-3, "rotation {:?}", rotation);
        assert!(rotation.x.abs() < 1e-3);
    }

    #[test]
    fn test_throttle_keeps_trailing_value() {
        let (mut tilt, _) = tilt(false);
        assert!(tilt.on_pointer_move(100.0, 50.0, (100, 100)));
        assert!(!tilt.on_pointer_move(0.0, 50.0, (100, 100)));
        assert_eq!(tilt.target().y, 0.25);

        tilt.update(0.1);
        assert_eq!(tilt.target().y, -0.25);
    }

    #[test]
    fn test_reduced_motion_never_attaches() {
        let (mut tilt, gate) = tilt(true);
        tilt.set_visible(false);
        tilt.set_visible(true);

        assert!(!tilt.on_pointer_move(100.0, 100.0, (100, 100)));
        assert_eq!(gate.attach_count(), 0);
        assert_eq!(tilt.rotation(), Vec2::ZERO);
    }

    #[test]
    fn test_hidden_holds_rotation() {
        let (mut tilt, gate) = tilt(false);
        tilt.on_pointer_move(100.0, 100.0, (100, 100));
        for _ in 0..10 {
            tilt.update(1.0 / 60.0);
        }
        let held = tilt.rotation();

        tilt.set_visible(false);
        assert!(!gate.is_attached());
        for _ in 0..60 {
            tilt.update(1.0 / 60.0);
        }
        assert_eq!(tilt.rotation(), held);
    }

    #[test]
    fn test_preset_toggle_swaps_visibility_and_camera() {
        let mut graph = SceneGraph::new();
        let shell = graph.add(Node::named("Shell"), None);
        let core = graph.add(Node::named("Core"), None);
        graph.set_visible(core, false);

        let pair = PresetPair {
            full: PresetConfig {
                visibility: BTreeMap::from([("Shell".into(), true), ("Core".into(), false)]),
                camera_position: [0.0, 0.0, 6.0],
            },
            cutaway: PresetConfig {
                visibility: BTreeMap::from([
                    ("Shell".into(), false),
                    ("Core".into(), true),
                    ("Missing".into(), true),
                ]),
                camera_position: [0.0, 1.0, 4.0],
            },
        };
        let mut toggle = PresetToggle::resolve(&pair, &graph);

        let camera = toggle.toggle(&mut graph);
        assert!(toggle.is_cutaway());
        assert_eq!(camera, Vec3::new(0.0, 1.0, 4.0));
        assert!(!graph.is_visible(shell));
        assert!(graph.is_visible(core));

        let camera = toggle.toggle(&mut graph);
        assert_eq!(camera, Vec3::new(0.0, 0.0, 6.0));
        assert!(graph.is_visible(shell));
        assert!(!graph.is_visible(core));
    }

    #[test]
    fn test_orbit_round_trips_position() {
        let position = Vec3::new(3.0, 2.0, 4.0);
        let controls = OrbitControls::new(position, Vec3::ZERO, OrbitConfig::default());
        assert!(controls.position().abs_diff_eq(position, 1e-4));
    }

    #[test]
    fn test_orbit_drag_glides_then_stops() {
        let mut controls = OrbitControls::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, OrbitConfig::default());
        let start = controls.position();

        controls.drag(50.0, 0.0, 500.0);
        controls.update(1.0 / 60.0);
        let after_one = controls.position();
        assert!(!after_one.abs_diff_eq(start, 1e-4));

        for _ in 0..600 {
            controls.update(1.0 / 60.0);
        }
        assert!(!controls.is_moving());
        assert!((controls.position().length() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_orbit_glide_ignores_refresh_rate() {
        let glide = |hz: f32| {
            let mut controls = OrbitControls::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, OrbitConfig::default());
            controls.drag(100.0, 0.0, 800.0);
            for _ in 0..(10.0 * hz) as usize {
                controls.update(1.0 / hz);
            }
            assert!(!controls.is_moving());
            controls.azimuth
        };

        let at_60 = glide(60.0);
        assert!(at_60 < -0.1, "azimuth {}", at_60);
        for hz in [120.0, 144.0, 240.0] {
            let azimuth = glide(hz);
            assert!((azimuth - at_60).abs() < 1e-3, "{} Hz glided to {}, 60 Hz to {}", hz, azimuth, at_60);
        }
    }

    #[test]
    fn test_orbit_without_damping_applies_immediately() {
        let mut controls = OrbitControls::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, OrbitConfig::default());
        controls.set_damping_enabled(false);
        let start = controls.position();

        controls.drag(0.0, 10_000.0, 500.0);
        assert!(!controls.position().abs_diff_eq(start, 1e-4));
        assert!(!controls.is_moving());
        // Clamped at the minimum polar angle
        let polar = (controls.position().y / 5.0).acos().to_degrees();
        assert!((polar - 30.0).abs() < 1e-2);
    }
}
