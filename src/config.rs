//! Scene configuration
//!
//! Every field has a default, so a config file only lists what it changes.
//! Defaults come from the scene kind named in the file (`"kind"`), which is
//! the laptop when absent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::animation::SpringParams;
use crate::error::ConfigError;
use crate::interaction::{OrbitConfig, PresetConfig, PresetPair};
use crate::loaders::ScreenTexture;
use crate::passes::ShadowConfig;
use crate::scene::{CameraConfig, LightRig};
use crate::scenes::{OpenAnimationConfig, Role, RoleEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    #[default]
    Laptop,
    Globe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub kind: SceneKind,
    /// glTF / glb model, relative to the asset source
    pub model: String,
    /// Cubemap faces in +X, -X, +Y, -Y, +Z, -Z order
    pub environment: [String; 6],
    pub background: Option<String>,
    pub screen: Option<ScreenTexture>,
    pub clear_color: [f32; 4],
    pub camera: CameraConfig,
    pub lights: LightRig,
    pub spring: SpringParams,
    pub pointer_throttle_ms: u64,
    pub shadow: Option<ShadowConfig>,
    pub roles: Vec<RoleEntry>,
    pub presets: Option<PresetPair>,
    pub open: Option<OpenAnimationConfig>,
    pub orbit: Option<OrbitConfig>,
    pub screen_fade_ms: u64,
    pub clip_time_scale: f32,
    pub autoplay_clips: bool,
    pub reduced_motion: bool,
    pub device_pixel_ratio: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::laptop()
    }
}

fn cubemap(dir: &str) -> [String; 6] {
    ["px", "nx", "py", "ny", "pz", "nz"].map(|face| format!("{}/{}.png", dir, face))
}

fn role(node: &str, role: Role) -> RoleEntry {
    RoleEntry {
        node: node.to_string(),
        role,
    }
}

impl SceneConfig {
    pub fn for_kind(kind: SceneKind) -> Self {
        match kind {
            SceneKind::Laptop => Self::laptop(),
            SceneKind::Globe => Self::globe(),
        }
    }

    /// Tilting laptop with an opening lid and a soft ground shadow
    pub fn laptop() -> Self {
        Self {
            kind: SceneKind::Laptop,
            model: "laptop.glb".to_string(),
            environment: cubemap("env/studio"),
            background: None,
            screen: Some(ScreenTexture {
                placeholder: Some("screen/placeholder.jpg".to_string()),
                srcset: "screen/screen-800.jpg 800w, screen/screen-1920.jpg 1920w".to_string(),
            }),
            clear_color: [0.0, 0.0, 0.0, 0.0],
            camera: CameraConfig {
                position: [0.0, 1.2, 6.0],
                target: [0.0, 0.1, 0.0],
                ..CameraConfig::default()
            },
            lights: LightRig::studio(),
            spring: SpringParams::default(),
            pointer_throttle_ms: 100,
            shadow: Some(ShadowConfig::default()),
            roles: vec![
                role("Frame", Role::Frame),
                role("Screen", Role::Screen),
                role("Logo", Role::Logo),
                role("Keyboard", Role::Decorative),
            ],
            presets: None,
            open: Some(OpenAnimationConfig::default()),
            orbit: None,
            screen_fade_ms: 400,
            clip_time_scale: 1.0,
            autoplay_clips: false,
            reduced_motion: false,
            device_pixel_ratio: 1.0,
        }
    }

    /// Animated globe with orbit controls and a click-toggled cutaway
    pub fn globe() -> Self {
        let full_camera = [0.0, 0.0, 6.0];
        Self {
            kind: SceneKind::Globe,
            model: "globe.glb".to_string(),
            environment: cubemap("env/space"),
            background: Some("space.jpg".to_string()),
            screen: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            camera: CameraConfig {
                position: full_camera,
                fov_degrees: 40.0,
                ..CameraConfig::default()
            },
            lights: LightRig::studio(),
            spring: SpringParams::default(),
            pointer_throttle_ms: 100,
            shadow: None,
            roles: vec![
                role("Shell", Role::Frame),
                role("Continents", Role::Decorative),
                role("Core", Role::Cutaway),
            ],
            presets: Some(PresetPair {
                full: PresetConfig {
                    visibility: [("Shell".to_string(), true), ("Core".to_string(), false)].into(),
                    camera_position: full_camera,
                },
                cutaway: PresetConfig {
                    visibility: [("Shell".to_string(), false), ("Core".to_string(), true)].into(),
                    camera_position: [0.0, 1.5, 4.5],
                },
            }),
            open: None,
            orbit: Some(OrbitConfig::default()),
            screen_fade_ms: 400,
            clip_time_scale: 0.5,
            autoplay_clips: true,
            reduced_motion: false,
            device_pixel_ratio: 1.0,
        }
    }

    /// Parse JSON over the defaults of the kind it names
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let overrides: serde_json::Value = serde_json::from_str(json)?;
        let kind = match overrides.get("kind") {
            Some(kind) => serde_json::from_value(kind.clone())?,
            None => SceneKind::default(),
        };

        let mut merged = serde_json::to_value(Self::for_kind(kind))?;
        if let (Some(base), serde_json::Value::Object(fields)) = (merged.as_object_mut(), overrides) {
            for (key, value) in fields {
                base.insert(key, value);
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        log::info!("loaded {:?} scene config from {}", config.kind, path.display());
        Ok(config)
    }

    pub fn pointer_throttle_seconds(&self) -> f32 {
        self.pointer_throttle_ms as f32 / 1000.0
    }

    pub fn screen_fade_seconds(&self) -> f32 {
        self.screen_fade_ms as f32 / 1000.0
    }
}
