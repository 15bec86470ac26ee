use serde::{Deserialize, Serialize};

/// Mass / stiffness / damping of a spring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringParams {
    pub stiffness: f32,
    pub damping: f32,
    pub mass: f32,
}

impl Default for SpringParams {
    fn default() -> Self {
        Self {
            stiffness: 40.0,
            damping: 20.0,
            mass: 1.4,
        }
    }
}

/// Scalar that approaches its target under a damped spring
///
/// Stepped explicitly by the caller (semi-implicit Euler) so the result only
/// depends on the integration timestep, never on how often input arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    value: f32,
    velocity: f32,
    target: f32,
    params: SpringParams,
}

impl Spring {
    pub fn new(value: f32, params: SpringParams) -> Self {
        Self {
            value,
            velocity: 0.0,
            target: value,
            params,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump to `value` and stop
    pub fn snap(&mut self, value: f32) {
        self.value = value;
        self.target = value;
        self.velocity = 0.0;
    }

    /// Halt motion where it is
    pub fn hold(&mut self) {
        self.target = self.value;
        self.velocity = 0.0;
    }

    /// Advance by one fixed timestep
    pub fn step(&mut self, dt: f32) {
        let mass = self.params.mass.max(f32::EPSILON);
        let force = -self.params.stiffness * (self.value - self.target) - self.params.damping * self.velocity;
        self.velocity += force / mass * dt;
        self.value += self.velocity * dt;
    }

    pub fn is_settled(&self, epsilon: f32) -> bool {
        (self.value - self.target).abs() < epsilon && self.velocity.abs() < epsilon
    }
}
