// cli.rs - Command-line interface configuration
use std::path::PathBuf;

use clap::Parser;

use crate::config::{SceneConfig, SceneKind};
use crate::error::ConfigError;

#[derive(Parser, Debug, Clone)]
#[command(name = "folio-render")]
#[command(about = "Portfolio laptop and globe scenes", long_about = None)]
pub struct Cli {
    /// Scene to mount when no config file is given
    #[arg(long, value_enum, default_value_t = SceneKind::Laptop)]
    pub scene: SceneKind,

    /// Directory asset paths are resolved against
    #[arg(long, default_value = "assets")]
    pub assets: PathBuf,

    /// JSON scene config; its "kind" overrides --scene
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip pointer tilt, springs and fades
    #[arg(long = "reduced-motion", default_value = "false")]
    pub reduced_motion: bool,

    /// Render this many frames on the recording device and exit
    #[arg(long, value_name = "FRAMES")]
    pub headless: Option<u64>,

    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    #[arg(long, default_value_t = 800)]
    pub height: u32,
}

impl Cli {
    pub fn scene_config(&self) -> Result<SceneConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SceneConfig::from_file(path)?,
            None => SceneConfig::for_kind(self.scene),
        };
        if self.reduced_motion {
            config.reduced_motion = true;
        }
        Ok(config)
    }
}
