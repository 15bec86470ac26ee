//! Scene context creation and ordered teardown
//!
//! A [`SceneContext`] owns every GPU object of one mounted scene: the
//! renderer, lights, the scene graph and offscreen render targets. Release
//! disposes them in a fixed order and then drops the device, so nothing
//! that outlives the context can reach the graphics API again.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::gpu::{GraphicsDevice, RenderTargetDesc, ResourceId};
use crate::render_loop::{FrameRequestId, FrameScheduler, LoopState, RenderLoop};
use crate::scene::{Camera, CameraConfig, LightRig, SceneGraph};

/// Shared flag telling in-flight async work whether its scene still exists
///
/// Cloning is cheap (Rc). Flips to dead exactly once, at release.
#[derive(Debug, Clone)]
pub struct Liveness(Rc<Cell<bool>>);

impl Liveness {
    fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.get()
    }

    fn kill(&self) {
        self.0.set(false);
    }
}

/// Borrowed view of the parts a frame or a load needs together
pub struct ContextParts<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub graph: &'a mut SceneGraph,
    pub camera: &'a mut Camera,
    pub lights: Option<ResourceId>,
}

pub struct SceneContext {
    device: Option<Box<dyn GraphicsDevice>>,
    scheduler: Box<dyn FrameScheduler>,
    camera: Camera,
    graph: SceneGraph,
    lights_uniform: Option<ResourceId>,
    render_targets: Vec<ResourceId>,
    render_loop: RenderLoop,
    liveness: Liveness,
    canvas: (u32, u32),
}

impl SceneContext {
    /// Size the renderer to the canvas, place the camera and install the
    /// light rig on an empty graph
    pub fn acquire(
        mut device: Box<dyn GraphicsDevice>,
        scheduler: Box<dyn FrameScheduler>,
        canvas: (u32, u32),
        camera: &CameraConfig,
        lights: &LightRig,
    ) -> Self {
        let (width, height) = (canvas.0.max(1), canvas.1.max(1));
        if device.size() != (width, height) {
            device.resize(width, height);
        }
        let lights_uniform = device.create_uniform("Lights", bytemuck::bytes_of(&lights.uniform()));

        log::info!("scene context acquired at {}x{}", width, height);
        Self {
            device: Some(device),
            scheduler,
            camera: Camera::perspective(camera, width as f32 / height as f32),
            graph: SceneGraph::new(),
            lights_uniform: Some(lights_uniform),
            render_targets: Vec::new(),
            render_loop: RenderLoop::new(),
            liveness: Liveness::new(),
            canvas: (width, height),
        }
    }

    pub fn is_released(&self) -> bool {
        self.device.is_none()
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Device, graph and camera together; `None` once released
    pub fn parts(&mut self) -> Option<ContextParts<'_>> {
        let device = self.device.as_deref_mut()?;
        Some(ContextParts {
            device,
            graph: &mut self.graph,
            camera: &mut self.camera,
            lights: self.lights_uniform,
        })
    }

    /// Offscreen target disposed by this context at release
    pub fn create_render_target(&mut self, desc: RenderTargetDesc) -> Option<ResourceId> {
        let id = self.device.as_mut()?.create_render_target(desc);
        self.render_targets.push(id);
        Some(id)
    }

    /// Resize renderer and camera; zero or unchanged sizes are ignored
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.canvas == (width, height) {
            return;
        }
        let Some(device) = self.device.as_mut() else {
            return;
        };
        device.resize(width, height);
        self.canvas = (width, height);
        self.camera.set_aspect(width as f32 / height as f32);
        log::debug!("canvas resized to {}x{}", width, height);
    }

    // === Render loop ===

    pub fn loop_state(&self) -> LoopState {
        self.render_loop.state()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.render_loop.frames()
    }

    pub fn is_loaded(&self) -> bool {
        self.render_loop.is_loaded()
    }

    pub fn is_visible(&self) -> bool {
        self.render_loop.is_visible()
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        if self.is_released() {
            return;
        }
        self.render_loop.set_loaded(loaded, self.scheduler.as_mut());
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.is_released() {
            return;
        }
        self.render_loop.set_visible(visible, self.scheduler.as_mut());
    }

    /// Accept a frame callback; `None` when stale or released
    pub fn begin_frame(&mut self, id: FrameRequestId, now: Instant) -> Option<f32> {
        if self.is_released() {
            return None;
        }
        self.render_loop.begin(id, now)
    }

    pub fn finish_frame(&mut self, succeeded: bool) {
        self.render_loop.finish(succeeded, self.scheduler.as_mut());
    }

    // === Teardown ===

    /// Dispose everything this context created
    ///
    /// Order: pending frame, lights, scene graph, render targets, renderer.
    /// Safe to call repeatedly and before loading finished.
    pub fn release(&mut self) {
        self.liveness.kill();
        self.render_loop.cancel(self.scheduler.as_mut());

        let Some(mut device) = self.device.take() else {
            return;
        };

        if let Some(lights) = self.lights_uniform.take() {
            device.dispose(lights);
        }

        let owned = self.graph.clear();
        let graph_resources = owned.len();
        for id in owned {
            device.dispose(id);
        }

        let targets = self.render_targets.len();
        for id in self.render_targets.drain(..) {
            device.dispose(id);
        }

        device.dispose_renderer();
        log::info!(
            "scene context released ({} graph resources, {} render targets)",
            graph_resources,
            targets
        );
    }
}

impl Drop for SceneContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SceneContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneContext")
            .field("released", &self.is_released())
            .field("canvas", &self.canvas)
            .field("loop_state", &self.render_loop.state())
            .field("nodes", &self.graph.node_count())
            .finish()
    }
}
