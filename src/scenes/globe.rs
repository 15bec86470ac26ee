use std::time::Instant;

use super::{LoadRequest, LoadState, LoadedCallback, Scene, SceneCore};
use crate::animation::Mixer;
use crate::config::{SceneConfig, SceneKind};
use crate::core::PointerEvent;
use crate::error::RenderError;
use crate::gpu::GraphicsDevice;
use crate::interaction::{OrbitControls, PresetToggle};
use crate::lifecycle::SceneContext;
use crate::loaders::InitialAssets;
use crate::render_loop::{FrameRequestId, FrameScheduler};

/// Animated globe in front of a background image
///
/// Drag orbits the camera; a click swaps between the full globe and the
/// cutaway preset.
pub struct GlobeScene {
    core: SceneCore,
    mixer: Mixer,
    orbit: Option<OrbitControls>,
    presets: Option<PresetToggle>,
}

impl GlobeScene {
    pub fn new(
        config: SceneConfig,
        device: Box<dyn GraphicsDevice>,
        scheduler: Box<dyn FrameScheduler>,
        canvas: (u32, u32),
    ) -> Self {
        let mixer = Mixer::new().with_time_scale(config.clip_time_scale);
        let core = SceneCore::new(config, device, scheduler, canvas);
        let orbit = core.config.orbit.map(|orbit_config| {
            let camera = core.ctx.camera();
            let mut orbit = OrbitControls::new(camera.position, camera.target, orbit_config);
            orbit.set_damping_enabled(!core.config.reduced_motion);
            orbit
        });

        Self {
            core,
            mixer,
            orbit,
            presets: None,
        }
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn is_cutaway(&self) -> bool {
        self.presets.as_ref().is_some_and(PresetToggle::is_cutaway)
    }

    fn toggle_preset(&mut self) {
        let Some(presets) = &mut self.presets else {
            return;
        };
        let position = presets.toggle(self.core.ctx.graph_mut());
        match &mut self.orbit {
            Some(orbit) => {
                orbit.set_position(position);
                self.core.ctx.camera_mut().position = orbit.position();
            }
            None => self.core.ctx.camera_mut().position = position,
        }
    }

    fn render(&mut self, delta: f32) -> Result<(), RenderError> {
        // Clips hold their pose under reduced motion
        if !self.core.config.reduced_motion {
            self.mixer.update(delta, self.core.ctx.graph_mut());
        }
        if let Some(orbit) = &mut self.orbit {
            orbit.update(delta);
            self.core.ctx.camera_mut().position = orbit.position();
        }
        self.core.draw_main()
    }
}

impl Scene for GlobeScene {
    fn kind(&self) -> SceneKind {
        SceneKind::Globe
    }

    fn load_state(&self) -> LoadState {
        self.core.state
    }

    fn context(&self) -> &SceneContext {
        &self.core.ctx
    }

    fn begin_load(&mut self) -> Option<LoadRequest> {
        self.core.begin_load(Vec::new())
    }

    fn finish_load(&mut self, assets: InitialAssets) {
        if !self.core.install(assets) {
            return;
        }
        if let Some(model) = &self.core.model {
            if self.core.config.autoplay_clips {
                for clip in &model.clips {
                    self.mixer.play(clip.clone());
                }
            }
        }
        if self.core.config.reduced_motion {
            // Held clips still show their first frame, not the rest pose
            self.mixer.pose(self.core.ctx.graph_mut());
        }
        self.presets = self
            .core
            .config
            .presets
            .as_ref()
            .map(|pair| PresetToggle::resolve(pair, self.core.ctx.graph()));
        self.core.mark_loaded();
    }

    fn set_loaded_callback(&mut self, callback: LoadedCallback) {
        self.core.set_loaded_callback(callback);
    }

    fn take_loaded_callback(&mut self) -> Option<LoadedCallback> {
        self.core.take_loaded_callback()
    }

    fn on_frame(&mut self, id: FrameRequestId, now: Instant) -> Result<(), RenderError> {
        let Some(delta) = self.core.ctx.begin_frame(id, now) else {
            return Ok(());
        };
        let result = self.render(delta);
        self.core.ctx.finish_frame(result.is_ok());
        result
    }

    fn set_visible(&mut self, visible: bool) {
        self.core.ctx.set_visible(visible);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.core.ctx.resize(width, height);
    }

    fn set_reduced_motion(&mut self, reduced_motion: bool) {
        self.core.config.reduced_motion = reduced_motion;
        if let Some(orbit) = &mut self.orbit {
            orbit.set_damping_enabled(!reduced_motion);
        }
    }

    fn pointer(&mut self, event: PointerEvent) {
        if self.core.state != LoadState::Loaded || self.core.ctx.is_released() {
            return;
        }
        match event {
            PointerEvent::Dragged { dx, dy } => {
                let (_, height) = self.core.ctx.canvas_size();
                if let Some(orbit) = &mut self.orbit {
                    orbit.drag(dx, dy, height as f32);
                }
            }
            PointerEvent::Clicked { .. } => self.toggle_preset(),
            PointerEvent::Moved { .. } => {}
        }
    }

    fn unmount(&mut self) {
        self.mixer.stop_all();
        self.core.unmount();
    }
}

impl std::fmt::Debug for GlobeScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobeScene")
            .field("state", &self.core.state)
            .field("context", &self.core.ctx)
            .field("clips", &self.mixer.len())
            .field("cutaway", &self.is_cutaway())
            .finish()
    }
}
