//! The two mounted scenes and what they share
//!
//! A scene is created synchronously (renderer sized, camera placed, lights
//! installed) and then loaded with [`load`], which joins the model,
//! environment and background loads. Once the join lands the scene turns
//! `Loaded`, fires its loaded callback and the render loop starts. Loads
//! that complete after [`Scene::unmount`] do nothing.

pub mod assembly;
pub mod globe;
pub mod laptop;
pub mod screen;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;

pub use assembly::{OpenAnimation, OpenAnimationConfig, Role, RoleEntry, RoleIndex};
pub use globe::GlobeScene;
pub use laptop::LaptopScene;
pub use screen::{ScreenSwap, SCREEN_OVERLAY};

use crate::config::{SceneConfig, SceneKind};
use crate::core::{PointerEvent, PointerSource};
use crate::error::{LoadError, RenderError};
use crate::gpu::{Background, GraphicsDevice, ImageData, ResourceId, ScenePass, Target};
use crate::lifecycle::{Liveness, SceneContext};
use crate::loaders::{AssetLoader, InitialAssets, ModelInstance};
use crate::render_loop::{FrameRequestId, FrameScheduler};

/// One-directional load progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotStarted,
    Loading,
    Loaded,
}

/// Textures fetched alongside the initial join but applied on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    ScreenPlaceholder,
    ScreenFull,
}

/// Everything one load needs, captured before the first await
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub model: String,
    pub environment: [String; 6],
    pub background: Option<String>,
    pub textures: Vec<(TextureSlot, String)>,
    pub liveness: Liveness,
}

pub type LoadedCallback = Box<dyn FnOnce()>;

pub trait Scene {
    fn kind(&self) -> SceneKind;

    fn load_state(&self) -> LoadState;

    fn context(&self) -> &SceneContext;

    /// Mark the scene loading and describe what to fetch; `None` when a
    /// load already started or the scene is gone
    fn begin_load(&mut self) -> Option<LoadRequest>;

    /// Place the joined initial assets and start rendering
    fn finish_load(&mut self, assets: InitialAssets);

    /// A texture from [`LoadRequest::textures`] arrived
    fn texture_arrived(&mut self, _slot: TextureSlot, _image: ImageData) {}

    /// Run `callback` once, when loading finishes
    fn set_loaded_callback(&mut self, callback: LoadedCallback);

    /// Callback to run once loading finished; taken at most once
    fn take_loaded_callback(&mut self) -> Option<LoadedCallback>;

    /// Frame callback from the host
    fn on_frame(&mut self, id: FrameRequestId, now: Instant) -> Result<(), RenderError>;

    fn set_visible(&mut self, visible: bool);

    fn resize(&mut self, width: u32, height: u32);

    fn set_reduced_motion(&mut self, reduced_motion: bool);

    fn pointer(&mut self, event: PointerEvent);

    /// Release every GPU resource and stop all motion; safe to repeat
    fn unmount(&mut self);
}

/// Fetch and place a scene's assets
///
/// The initial loads are joined: the first error is returned and the
/// scene never becomes loaded. Extra textures are fetched concurrently and
/// delivered as they arrive; their failures are logged only.
pub fn load<S>(scene: &Rc<RefCell<S>>, loader: AssetLoader) -> LocalBoxFuture<'static, Result<(), LoadError>>
where
    S: Scene + ?Sized + 'static,
{
    let request = scene.borrow_mut().begin_load();
    let weak = Rc::downgrade(scene);

    async move {
        let Some(LoadRequest {
            model,
            environment,
            background,
            textures,
            liveness,
        }) = request
        else {
            return Ok(());
        };

        let initial = {
            let (loader, weak, liveness) = (loader.clone(), weak.clone(), liveness.clone());
            async move {
                let result = loader
                    .load_initial(&model, &environment, background.as_deref())
                    .await;
                let scene = match weak.upgrade() {
                    Some(scene) if liveness.is_alive() => scene,
                    _ => {
                        log::debug!("scene unmounted before its assets arrived");
                        return Ok(());
                    }
                };
                let assets = match result {
                    Ok(assets) => assets,
                    Err(e) => {
                        log::error!("scene assets failed to load: {}", e);
                        return Err(e);
                    }
                };
                scene.borrow_mut().finish_load(assets);
                let callback = scene.borrow_mut().take_loaded_callback();
                if let Some(callback) = callback {
                    callback();
                }
                Ok(())
            }
        };

        let textures = join_all(textures.into_iter().map(|(slot, url)| {
            let (loader, weak, liveness) = (loader.clone(), weak.clone(), liveness.clone());
            async move {
                let result = loader.load_texture(&url).await;
                let Some(scene) = weak.upgrade().filter(|_| liveness.is_alive()) else {
                    return;
                };
                match result {
                    Ok(image) => scene.borrow_mut().texture_arrived(slot, image),
                    Err(e) => log::warn!("{:?} texture failed: {}", slot, e),
                }
            }
        }));

        let (result, _) = futures::join!(initial, textures);
        result
    }
    .boxed_local()
}

/// State and draw path common to both scenes
pub(crate) struct SceneCore {
    pub(crate) ctx: SceneContext,
    pub(crate) config: SceneConfig,
    pub(crate) state: LoadState,
    pub(crate) model: Option<ModelInstance>,
    pub(crate) roles: RoleIndex,
    environment: Option<ResourceId>,
    background: Option<ResourceId>,
    on_loaded: Option<LoadedCallback>,
}

impl SceneCore {
    pub(crate) fn new(
        config: SceneConfig,
        device: Box<dyn GraphicsDevice>,
        scheduler: Box<dyn FrameScheduler>,
        canvas: (u32, u32),
    ) -> Self {
        let ctx = SceneContext::acquire(device, scheduler, canvas, &config.camera, &config.lights);
        Self {
            ctx,
            config,
            state: LoadState::NotStarted,
            model: None,
            roles: RoleIndex::default(),
            environment: None,
            background: None,
            on_loaded: None,
        }
    }

    pub(crate) fn set_loaded_callback(&mut self, callback: LoadedCallback) {
        self.on_loaded = Some(callback);
    }

    pub(crate) fn take_loaded_callback(&mut self) -> Option<LoadedCallback> {
        if self.state == LoadState::Loaded {
            self.on_loaded.take()
        } else {
            None
        }
    }

    pub(crate) fn begin_load(&mut self, textures: Vec<(TextureSlot, String)>) -> Option<LoadRequest> {
        if self.state != LoadState::NotStarted || self.ctx.is_released() {
            return None;
        }
        self.state = LoadState::Loading;
        log::info!("loading {:?} scene from {}", self.config.kind, self.config.model);
        Some(LoadRequest {
            model: self.config.model.clone(),
            environment: self.config.environment.clone(),
            background: self.config.background.clone(),
            textures,
            liveness: self.ctx.liveness(),
        })
    }

    /// Upload environment and background, place the model and apply role
    /// visibility; returns false on a released context
    pub(crate) fn install(&mut self, assets: InitialAssets) -> bool {
        let Some(parts) = self.ctx.parts() else {
            return false;
        };

        let environment = assets.environment.upload(parts.device);
        parts.graph.adopt(environment);
        let background = assets.background.as_ref().map(|image| {
            let id = parts.device.upload_texture(image);
            parts.graph.adopt(id);
            id
        });

        let instance = assets.model.instantiate(parts.graph, parts.device, None);
        let roles = RoleIndex::build(parts.graph, &self.config.roles);
        roles.apply_default_visibility(parts.graph);

        self.environment = Some(environment);
        self.background = background;
        self.model = Some(instance);
        self.roles = roles;
        true
    }

    /// Flip to loaded and let the render loop start
    pub(crate) fn mark_loaded(&mut self) {
        self.state = LoadState::Loaded;
        self.ctx.set_loaded(true);
        log::info!(
            "{:?} scene loaded ({} nodes)",
            self.config.kind,
            self.ctx.graph().node_count()
        );
    }

    /// Main camera render to the surface, then present
    pub(crate) fn draw_main(&mut self) -> Result<(), RenderError> {
        let background = match self.background {
            Some(texture) => Background::Texture(texture),
            None => Background::Color(self.config.clear_color),
        };
        let environment = self.environment;
        let parts = self.ctx.parts().ok_or(RenderError::Disposed)?;

        parts.graph.sync_materials(parts.device);
        let items = parts.graph.draw_items();
        parts.device.draw_scene(&ScenePass {
            label: "main",
            target: Target::Surface,
            view: parts.camera.uniforms(),
            background,
            lights: parts.lights,
            environment,
            material_override: None,
            items: &items,
        })?;
        parts.device.present()
    }

    pub(crate) fn unmount(&mut self) {
        self.on_loaded = None;
        self.ctx.release();
    }
}

/// Create the scene named by `config.kind`
///
/// `pointer` gates hover input for scenes that follow the pointer.
pub fn mount(
    config: SceneConfig,
    device: Box<dyn GraphicsDevice>,
    scheduler: Box<dyn FrameScheduler>,
    canvas: (u32, u32),
    pointer: Box<dyn PointerSource>,
) -> Rc<RefCell<dyn Scene>> {
    match config.kind {
        SceneKind::Laptop => Rc::new(RefCell::new(LaptopScene::new(config, device, scheduler, canvas, pointer))),
        SceneKind::Globe => Rc::new(RefCell::new(GlobeScene::new(config, device, scheduler, canvas))),
    }
}
