use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::gpu::{
    Background, BlurDirection, FullscreenPass, FullscreenProgram, GeometryData, GraphicsDevice,
    MaterialOverride, MaterialParams, RenderTargetDesc, ResourceId, ScenePass, Target,
};
use crate::lifecycle::SceneContext;
use crate::scene::{Camera, Mesh, Node, NodeKey, SceneGraph, Transform};

/// Name of the ground plane node that receives the blurred shadow
pub const SHADOW_PLANE: &str = "Contact Shadow";

/// Blur draws issued per frame: two radii, each horizontal then vertical
pub const BLUR_DRAWS_PER_FRAME: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Square render target size in texels
    pub resolution: u32,
    /// Blur radii in texels, wide then narrow
    pub blur_radii: [f32; 2],
    pub darkness: f32,
    pub opacity: f32,
    /// Ground plane edge length in world units
    pub plane_size: f32,
    /// How far above the plane occluders still cast a shadow
    pub height: f32,
    /// Plane height in world units
    pub ground_y: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: 512,
            blur_radii: [5.0, 2.0],
            darkness: 3.0,
            opacity: 0.8,
            plane_size: 8.0,
            height: 1.5,
            ground_y: -0.8,
        }
    }
}

/// Soft contact shadow from a blurred top-down depth silhouette
///
/// Each frame the visible scene (minus the ground plane) is drawn with the
/// depth override into render target A from an orthographic camera at the
/// ground, then blurred A→B→A at each radius. The plane samples A as its
/// alpha map during the main render.
#[derive(Debug, Clone)]
pub struct ContactShadow {
    target: ResourceId,
    scratch: ResourceId,
    camera: Camera,
    plane: NodeKey,
    config: ShadowConfig,
}

impl ContactShadow {
    /// Create the render target pair and the ground plane
    ///
    /// Returns `None` on a released context.
    pub fn install(ctx: &mut SceneContext, config: ShadowConfig) -> Option<Self> {
        let resolution = config.resolution.max(1);
        let target = ctx.create_render_target(RenderTargetDesc::square(resolution))?;
        let scratch = ctx.create_render_target(RenderTargetDesc::square(resolution))?;

        let parts = ctx.parts()?;
        let geometry = parts
            .device
            .upload_geometry(&GeometryData::plane(config.plane_size, config.plane_size));
        let material = parts.graph.add_material(MaterialParams {
            base_color: [0.0, 0.0, 0.0, 1.0],
            opacity: config.opacity,
            alpha_map: Some(target),
            transparent: true,
            unlit: true,
            ..MaterialParams::default()
        });
        let origin = Vec3::new(0.0, config.ground_y, 0.0);
        let plane = parts.graph.add(
            Node::named(SHADOW_PLANE)
                .with_transform(Transform::from_translation(origin))
                .with_mesh(Mesh { geometry, material }),
            None,
        );

        log::debug!(
            "contact shadow {}px, radii {:?}",
            resolution,
            config.blur_radii
        );
        Some(Self {
            target,
            scratch,
            camera: Camera::top_down(origin, config.plane_size, config.plane_size, config.height),
            plane,
            config: ShadowConfig { resolution, ..config },
        })
    }

    /// Render target A, sampled by the ground plane
    #[cfg(test)]
    pub(crate) fn target(&self) -> ResourceId {
        self.target
    }

    /// Render target B, blur scratch
    #[cfg(test)]
    pub(crate) fn scratch(&self) -> ResourceId {
        self.scratch
    }

    pub fn plane(&self) -> NodeKey {
        self.plane
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Blur step in UV units for a radius in texels
    pub fn texel_step(&self, radius: f32) -> f32 {
        radius / self.config.resolution as f32
    }

    /// Refresh the shadow for the current pose; run before the main draw
    pub fn render(&self, device: &mut dyn GraphicsDevice, graph: &mut SceneGraph) -> Result<(), RenderError> {
        let plane_visible = graph.is_visible(self.plane);
        graph.set_visible(self.plane, false);
        let items = graph.draw_items();
        graph.set_visible(self.plane, plane_visible);

        device.draw_scene(&ScenePass {
            label: "contact shadow depth",
            target: Target::RenderTarget(self.target),
            view: self.camera.uniforms(),
            background: Background::Transparent,
            lights: None,
            environment: None,
            material_override: Some(MaterialOverride::Depth {
                darkness: self.config.darkness,
            }),
            items: &items,
        })?;

        for radius in self.config.blur_radii {
            self.blur(device, BlurDirection::Horizontal, self.target, self.scratch, radius)?;
            self.blur(device, BlurDirection::Vertical, self.scratch, self.target, radius)?;
        }
        Ok(())
    }

    fn blur(
        &self,
        device: &mut dyn GraphicsDevice,
        direction: BlurDirection,
        source: ResourceId,
        target: ResourceId,
        radius: f32,
    ) -> Result<(), RenderError> {
        let label = match direction {
            BlurDirection::Horizontal => "contact shadow blur h",
            BlurDirection::Vertical => "contact shadow blur v",
        };
        device.draw_fullscreen(&FullscreenPass {
            label,
            source,
            target,
            program: FullscreenProgram::Blur {
                direction,
                texel_step: self.texel_step(radius),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceCall, RecordingDevice};
    use crate::render_loop::ManualScheduler;
    use crate::scene::{CameraConfig, LightRig};

    fn context() -> (SceneContext, crate::gpu::Ledger) {
        let device = RecordingDevice::new(64, 64);
        let ledger = device.ledger();
        let ctx = SceneContext::acquire(
            Box::new(device),
            Box::new(ManualScheduler::new()),
            (64, 64),
            &CameraConfig::default(),
            &LightRig::studio(),
        );
        (ctx, ledger)
    }

    #[test]
    fn texel_step_is_radius_over_resolution() {
        let (mut ctx, _) = context();
        let shadow = ContactShadow::install(&mut ctx, ShadowConfig::default()).unwrap();

        assert_eq!(shadow.texel_step(5.0), 5.0 / 512.0);
        assert_eq!(shadow.texel_step(2.0), 2.0 / 512.0);
    }

    #[test]
    fn render_hides_plane_only_for_the_depth_pass() {
        let (mut ctx, ledger) = context();
        let shadow = ContactShadow::install(&mut ctx, ShadowConfig::default()).unwrap();
        let parts = ctx.parts().unwrap();
        parts.graph.sync_materials(parts.device);
        let start = ledger.call_count();

        shadow.render(parts.device, parts.graph).unwrap();

        let calls = ledger.calls_since(start);
        match &calls[0] {
            DeviceCall::DrawScene {
                target,
                materials,
                material_override,
                ..
            } => {
                assert_eq!(*target, Target::RenderTarget(shadow.target()));
                assert!(materials.is_empty(), "plane must not cast onto itself");
                assert!(material_override.is_some());
            }
            other => panic!("expected depth pass, got {:?}", other),
        }
        assert!(parts.graph.is_visible(shadow.plane()));
    }

    #[test]
    fn blur_ping_pongs_between_targets() {
        let (mut ctx, ledger) = context();
        let shadow = ContactShadow::install(&mut ctx, ShadowConfig::default()).unwrap();
        let parts = ctx.parts().unwrap();
        let start = ledger.call_count();

        shadow.render(parts.device, parts.graph).unwrap();

        let passes: Vec<(ResourceId, ResourceId)> = ledger
            .calls_since(start)
            .iter()
            .filter_map(|call| match call {
                DeviceCall::DrawFullscreen { source, target, .. } => Some((*source, *target)),
                _ => None,
            })
            .collect();
        let (a, b) = (shadow.target(), shadow.scratch());
        assert_eq!(passes, vec![(a, b), (b, a), (a, b), (b, a)]);
        assert_eq!(passes.len(), BLUR_DRAWS_PER_FRAME);
    }
}
