use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use folio_render::cli::Cli;
use folio_render::core::{PointerGate, WinitPointer};
use folio_render::gpu::{RecordingDevice, WgpuDevice};
use folio_render::loaders::{AssetLoader, FsSource};
use folio_render::render_loop::{FrameRequestId, FrameScheduler, ManualScheduler};
use folio_render::scenes::{self, Scene};
use folio_render::{RenderError, SceneConfig};

/// Frame requests become window redraws
struct WindowScheduler {
    window: Arc<Window>,
    pending: Rc<Cell<Option<FrameRequestId>>>,
    next_id: FrameRequestId,
}

impl FrameScheduler for WindowScheduler {
    fn request_frame(&mut self) -> FrameRequestId {
        self.next_id += 1;
        self.pending.set(Some(self.next_id));
        self.window.request_redraw();
        self.next_id
    }

    fn cancel_frame(&mut self, id: FrameRequestId) {
        if self.pending.get() == Some(id) {
            self.pending.set(None);
        }
    }
}

/// Window visibility from its two independent sources
#[derive(Debug, Default, Clone, Copy)]
struct WindowVisibility {
    occluded: bool,
    minimized: bool,
}

impl WindowVisibility {
    fn is_visible(&self) -> bool {
        !self.occluded && !self.minimized
    }

    /// Minimized windows report a zero size
    fn resized(&mut self, width: u32, height: u32) -> bool {
        self.minimized = width == 0 || height == 0;
        self.is_visible()
    }

    fn occluded(&mut self, occluded: bool) -> bool {
        self.occluded = occluded;
        self.is_visible()
    }
}

struct App {
    config: SceneConfig,
    loader: AssetLoader,
    size: (u32, u32),
    window: Option<Arc<Window>>,
    scene: Option<Rc<RefCell<dyn Scene>>>,
    pending_frame: Rc<Cell<Option<FrameRequestId>>>,
    pointer: WinitPointer,
    gate: PointerGate,
    pool: LocalPool,
    visibility: WindowVisibility,
}

impl App {
    fn new(config: SceneConfig, loader: AssetLoader, size: (u32, u32)) -> Self {
        let gate = PointerGate::new();
        Self {
            config,
            loader,
            size,
            window: None,
            scene: None,
            pending_frame: Rc::new(Cell::new(None)),
            pointer: WinitPointer::new(gate.clone()),
            gate,
            pool: LocalPool::new(),
            visibility: WindowVisibility::default(),
        }
    }

    fn mount(&mut self, window: Arc<Window>) -> Result<()> {
        let device = pollster::block_on(WgpuDevice::new(window.clone())).map_err(renderer_init_error)?;
        let canvas = window.inner_size();
        let scheduler = WindowScheduler {
            window: window.clone(),
            pending: self.pending_frame.clone(),
            next_id: 0,
        };

        let scene = scenes::mount(
            self.config.clone(),
            Box::new(device),
            Box::new(scheduler),
            (canvas.width, canvas.height),
            Box::new(self.gate.clone()),
        );
        let window_for_title = window.clone();
        scene.borrow_mut().set_loaded_callback(Box::new(move || {
            window_for_title.set_title("folio-render");
        }));

        let load = scenes::load(&scene, self.loader.clone());
        self.pool
            .spawner()
            .spawn_local(async move {
                if let Err(e) = load.await {
                    log::error!("scene failed to load: {}", e);
                }
            })
            .context("failed to spawn scene load")?;

        self.window = Some(window);
        self.scene = Some(scene);
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(scene), Some(id)) = (&self.scene, self.pending_frame.take()) else {
            return;
        };
        let result = scene.borrow_mut().on_frame(id, Instant::now());
        match result {
            Ok(()) => {}
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                log::error!("surface out of memory, exiting");
                event_loop.exit();
            }
            Err(e) => {
                // The loop went idle; kick it once more
                log::warn!("frame failed: {}", e);
                let mut scene = scene.borrow_mut();
                scene.set_visible(false);
                scene.set_visible(self.visibility.is_visible());
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window = match event_loop.create_window(
            Window::default_attributes()
                .with_title("folio-render (loading)")
                .with_inner_size(winit::dpi::LogicalSize::new(self.size.0, self.size.1)),
        ) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.mount(window) {
            log::error!("{:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let (Some(pointer_event), Some(scene)) = (self.pointer.process_event(&event), &self.scene) {
            scene.borrow_mut().pointer(pointer_event);
        }

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => {
                if let Some(scene) = self.scene.take() {
                    scene.borrow_mut().unmount();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let visible = self.visibility.resized(size.width, size.height);
                if let Some(scene) = &self.scene {
                    let mut scene = scene.borrow_mut();
                    scene.set_visible(visible);
                    scene.resize(size.width, size.height);
                }
            }
            WindowEvent::Occluded(occluded) => {
                let visible = self.visibility.occluded(occluded);
                if let Some(scene) = &self.scene {
                    scene.borrow_mut().set_visible(visible);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.pool.run_until_stalled();
    }
}

/// Boxed backend errors carry no `Error` impl of their own, so wrap by message
fn renderer_init_error(e: Box<dyn std::error::Error + Send + Sync>) -> anyhow::Error {
    anyhow::anyhow!("failed to initialize renderer: {}", e)
}

/// Mount on the recording device, pump `frames` frames, unmount and check
/// nothing leaked
fn run_headless(config: SceneConfig, loader: AssetLoader, size: (u32, u32), frames: u64) -> Result<()> {
    let device = RecordingDevice::new(size.0, size.1);
    let ledger = device.ledger();
    let scheduler = ManualScheduler::new();

    let scene = scenes::mount(
        config,
        Box::new(device),
        Box::new(scheduler.clone()),
        size,
        Box::new(PointerGate::new()),
    );
    let mut pool = LocalPool::new();
    pool.run_until(scenes::load(&scene, loader))
        .context("failed to load scene assets")?;

    let start = Instant::now();
    let mut rendered = 0;
    while rendered < frames {
        let Some(id) = scheduler.take_next() else {
            break;
        };
        let now = start + Duration::from_millis(16 * rendered);
        scene.borrow_mut().on_frame(id, now).context("frame failed")?;
        rendered += 1;
    }
    scene.borrow_mut().unmount();

    log::info!(
        "headless: {} frames, {} surface draws, {} device calls",
        rendered,
        ledger.surface_draws(),
        ledger.call_count()
    );
    if ledger.live_count() != 0 {
        bail!("{} GPU resources leaked after unmount", ledger.live_count());
    }
    if ledger.calls_after_dispose() != 0 {
        bail!("{} graphics calls after renderer disposal", ledger.calls_after_dispose());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.scene_config().context("failed to read scene config")?;
    let loader = AssetLoader::new(FsSource::new(&cli.assets));
    let size = (cli.width, cli.height);

    if let Some(frames) = cli.headless {
        return run_headless(config, loader, size, frames);
    }

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, loader, size);
    log::info!("folio-render: drag or move the pointer, Escape to quit");
    event_loop.run_app(&mut app)?;

    Ok(())
}
