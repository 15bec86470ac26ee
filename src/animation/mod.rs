//! Time-driven value animation: springs, keyframe clips, tweens

pub mod clip;
pub mod spring;
pub mod tween;

pub use clip::{Channel, Clip, Interpolation, Keyframes, Mixer};
pub use spring::{Spring, SpringParams};
pub use tween::Tween;
