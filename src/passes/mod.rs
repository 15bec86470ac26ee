//! Offscreen passes run before the main draw

pub mod shadow;

pub use shadow::{ContactShadow, ShadowConfig, BLUR_DRAWS_PER_FRAME, SHADOW_PLANE};
