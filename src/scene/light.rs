use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::gpu::{DirectionalLightUniform, LightsUniform, MAX_DIRECTIONAL_LIGHTS};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    /// Direction the light travels in, world space
    pub direction: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
}

/// Fixed, hand-placed light rig of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightRig {
    pub ambient: [f32; 3],
    pub ambient_intensity: f32,
    pub directional: Vec<DirectionalLight>,
}

impl Default for LightRig {
    fn default() -> Self {
        Self::studio()
    }
}

impl LightRig {
    /// Soft ambient plus a key and a rim light
    pub fn studio() -> Self {
        Self {
            ambient: [1.0, 1.0, 1.0],
            ambient_intensity: 1.2,
            directional: vec![
                DirectionalLight {
                    direction: [-0.5, -1.0, -0.8],
                    color: [1.0, 1.0, 1.0],
                    intensity: 1.1,
                },
                DirectionalLight {
                    direction: [0.5, -0.2, 1.0],
                    color: [1.0, 1.0, 1.0],
                    intensity: 0.8,
                },
            ],
        }
    }

    /// Pack the rig for the lights uniform; extra lights are dropped
    pub fn uniform(&self) -> LightsUniform {
        if self.directional.len() > MAX_DIRECTIONAL_LIGHTS {
            log::warn!(
                "light rig has {} directional lights, only {} are used",
                self.directional.len(),
                MAX_DIRECTIONAL_LIGHTS
            );
        }

        let mut uniform = LightsUniform {
            ambient: (Vec3::from_array(self.ambient) * self.ambient_intensity)
                .extend(1.0)
                .to_array(),
            ..LightsUniform::default()
        };

        let lights = self.directional.iter().take(MAX_DIRECTIONAL_LIGHTS);
        for (slot, light) in uniform.directional.iter_mut().zip(lights) {
            *slot = DirectionalLightUniform {
                direction: Vec3::from_array(light.direction)
                    .normalize_or_zero()
                    .extend(0.0)
                    .to_array(),
                color: (Vec3::from_array(light.color) * light.intensity)
                    .extend(1.0)
                    .to_array(),
            };
        }
        uniform.count[0] = self.directional.len().min(MAX_DIRECTIONAL_LIGHTS) as u32;
        uniform
    }
}
