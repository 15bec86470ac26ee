use std::time::Instant;

use glam::{EulerRot, Quat};

use super::{LoadRequest, LoadState, LoadedCallback, OpenAnimation, Role, Scene, SceneCore, ScreenSwap, TextureSlot};
use crate::config::{SceneConfig, SceneKind};
use crate::core::{PointerEvent, PointerSource};
use crate::error::RenderError;
use crate::gpu::{GraphicsDevice, ImageData};
use crate::interaction::PointerTilt;
use crate::lifecycle::SceneContext;
use crate::loaders::{InitialAssets, TextureRequest};
use crate::passes::ContactShadow;
use crate::render_loop::{FrameRequestId, FrameScheduler};

/// Laptop on a soft contact shadow, tilting toward the pointer
///
/// On load the lid swings open after a short delay and the screen shows a
/// placeholder until the full-resolution image arrives.
pub struct LaptopScene {
    core: SceneCore,
    tilt: PointerTilt,
    shadow: Option<ContactShadow>,
    open: Option<OpenAnimation>,
    screen: ScreenSwap,
}

impl LaptopScene {
    pub fn new(
        config: SceneConfig,
        device: Box<dyn GraphicsDevice>,
        scheduler: Box<dyn FrameScheduler>,
        canvas: (u32, u32),
        pointer: Box<dyn PointerSource>,
    ) -> Self {
        let tilt = PointerTilt::new(
            config.spring,
            config.pointer_throttle_seconds(),
            pointer,
            config.reduced_motion,
        );
        let mut screen = ScreenSwap::new(config.screen_fade_seconds());
        screen.set_instant(config.reduced_motion);
        let shadow_config = config.shadow;

        let mut core = SceneCore::new(config, device, scheduler, canvas);
        let shadow = shadow_config.and_then(|shadow| ContactShadow::install(&mut core.ctx, shadow));

        Self {
            core,
            tilt,
            shadow,
            open: None,
            screen,
        }
    }

    pub fn tilt(&self) -> &PointerTilt {
        &self.tilt
    }

    pub fn shadow(&self) -> Option<&ContactShadow> {
        self.shadow.as_ref()
    }

    pub fn open_animation(&self) -> Option<&OpenAnimation> {
        self.open.as_ref()
    }

    pub fn screen(&self) -> &ScreenSwap {
        &self.screen
    }

    fn screen_textures(&self) -> Vec<(TextureSlot, String)> {
        let Some(screen) = &self.core.config.screen else {
            return Vec::new();
        };
        let mut textures = Vec::new();
        if let Some(placeholder) = &screen.placeholder {
            textures.push((TextureSlot::ScreenPlaceholder, placeholder.clone()));
        }
        let (width, _) = self.core.ctx.canvas_size();
        match TextureRequest::SrcSet(screen.srcset.clone()).resolve(width, self.core.config.device_pixel_ratio) {
            Ok(url) => textures.push((TextureSlot::ScreenFull, url)),
            Err(e) => log::warn!("screen texture skipped: {}", e),
        }
        textures
    }

    fn render(&mut self, delta: f32) -> Result<(), RenderError> {
        self.tilt.update(delta);
        let rotation = self.tilt.rotation();
        let model_root = self.core.model.as_ref().map(|model| model.root);

        let parts = self.core.ctx.parts().ok_or(RenderError::Disposed)?;
        if let Some(node) = model_root.and_then(|root| parts.graph.node_mut(root)) {
            node.transform.rotation = Quat::from_euler(EulerRot::YXZ, rotation.y, rotation.x, 0.0);
        }
        if let Some(open) = &mut self.open {
            open.update(delta, parts.graph);
        }
        self.screen.update(delta, parts.graph, parts.device);

        if let Some(shadow) = &self.shadow {
            parts.graph.sync_materials(parts.device);
            shadow.render(parts.device, parts.graph)?;
        }
        self.core.draw_main()
    }
}

impl Scene for LaptopScene {
    fn kind(&self) -> SceneKind {
        SceneKind::Laptop
    }

    fn load_state(&self) -> LoadState {
        self.core.state
    }

    fn context(&self) -> &SceneContext {
        &self.core.ctx
    }

    fn begin_load(&mut self) -> Option<LoadRequest> {
        let textures = self.screen_textures();
        self.core.begin_load(textures)
    }

    fn finish_load(&mut self, assets: InitialAssets) {
        if !self.core.install(assets) {
            return;
        }
        let reduced_motion = self.core.config.reduced_motion;
        let screen = self.core.roles.first(Role::Screen);
        let lid = self
            .core
            .config
            .open
            .as_ref()
            .and_then(|open| Some((self.core.roles.key(&open.node)?, open.clone())));

        if let Some(parts) = self.core.ctx.parts() {
            self.screen.attach(screen, parts.graph, parts.device);
            self.open = lid.map(|(node, config)| OpenAnimation::start(parts.graph, node, &config, reduced_motion));
        }
        self.core.mark_loaded();
    }

    fn texture_arrived(&mut self, slot: TextureSlot, image: ImageData) {
        let Some(parts) = self.core.ctx.parts() else {
            return;
        };
        match slot {
            TextureSlot::ScreenPlaceholder => self.screen.placeholder_arrived(image, parts.graph, parts.device),
            TextureSlot::ScreenFull => self.screen.full_arrived(image, parts.graph, parts.device),
        }
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
        self.tilt.set_visible(visible);
        self.core.ctx.set_visible(visible);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.core.ctx.resize(width, height);
    }

    fn set_reduced_motion(&mut self, reduced_motion: bool) {
        if self.core.config.reduced_motion == reduced_motion {
            return;
        }
        self.core.config.reduced_motion = reduced_motion;
        self.tilt.set_reduced_motion(reduced_motion);
        self.screen.set_instant(reduced_motion);
        if reduced_motion {
            if let Some(parts) = self.core.ctx.parts() {
                if let Some(open) = &mut self.open {
                    open.finish(parts.graph);
                }
                self.screen.skip_fade(parts.graph, parts.device);
            }
        }
    }

    fn pointer(&mut self, event: PointerEvent) {
        if let PointerEvent::Moved { x, y } = event {
            self.tilt.on_pointer_move(x, y, self.core.ctx.canvas_size());
        }
    }

    fn unmount(&mut self) {
        self.tilt.set_visible(false);
        self.open = None;
        self.core.unmount();
    }
}

impl std::fmt::Debug for LaptopScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaptopScene")
            .field("state", &self.core.state)
            .field("context", &self.core.ctx)
            .field("tilt", &self.tilt)
            .finish()
    }
}
