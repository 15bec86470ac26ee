pub mod animation;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod gpu;
pub mod interaction;
pub mod lifecycle;
pub mod loaders;
pub mod passes;
pub mod render_loop;
pub mod scene;
pub mod scenes;

pub use config::{SceneConfig, SceneKind};
pub use error::{ConfigError, LoadError, RenderError};
pub use lifecycle::{Liveness, SceneContext};
pub use render_loop::{FrameRequestId, FrameScheduler, LoopState, RenderLoop};
pub use scenes::{GlobeScene, LaptopScene, LoadState, Scene};
