//! Asynchronous asset fetch-and-decode
//!
//! Every load goes through an [`AssetSource`]; decoding is synchronous once
//! the bytes arrive. Scenes issue their initial loads together through
//! [`AssetLoader::load_initial`], which joins them: the first error wins
//! and nothing is returned until model, environment and background are all
//! decoded.

pub mod environment;
pub mod model;
pub mod source;
pub mod texture;

use std::rc::Rc;

use futures::future::try_join_all;

pub use environment::EnvironmentMap;
pub use model::{ModelAsset, ModelInstance, MODEL_ROOT};
pub use source::{AssetSource, FsSource, MemorySource};
pub use texture::{decode_image, ScreenTexture, SrcSet, TextureRequest};

use crate::error::LoadError;
use crate::gpu::ImageData;

/// Result of the joined initial loads
#[derive(Debug, Clone)]
pub struct InitialAssets {
    pub model: ModelAsset,
    pub environment: EnvironmentMap,
    pub background: Option<ImageData>,
}

/// Fetches and decodes assets from one source
///
/// Cloning is cheap (Rc); futures returned by the loader own a clone so
/// they can outlive the scene that started them.
#[derive(Clone)]
pub struct AssetLoader {
    source: Rc<dyn AssetSource>,
}

impl AssetLoader {
    pub fn new(source: impl AssetSource + 'static) -> Self {
        Self {
            source: Rc::new(source),
        }
    }

    pub async fn load_model(&self, url: &str) -> Result<ModelAsset, LoadError> {
        let bytes = self.source.fetch(url).await?;
        ModelAsset::decode(url, &bytes)
    }

    /// Fetch the six faces concurrently, then decode and pre-filter
    pub async fn load_environment(&self, faces: &[String; 6]) -> Result<EnvironmentMap, LoadError> {
        let bytes = try_join_all(faces.iter().map(|url| self.source.fetch(url))).await?;
        let bytes: [Vec<u8>; 6] = bytes
            .try_into()
            .map_err(|_| LoadError::InvalidEnvironment("face count changed while loading".to_string()))?;
        EnvironmentMap::decode(faces, &bytes)
    }

    pub async fn load_texture(&self, url: &str) -> Result<ImageData, LoadError> {
        let bytes = self.source.fetch(url).await?;
        decode_image(url, &bytes)
    }

    /// Load a URL, or the source-set candidate that fits the canvas
    pub async fn load_request(
        &self,
        request: &TextureRequest,
        canvas_width: u32,
        device_pixel_ratio: f32,
    ) -> Result<ImageData, LoadError> {
        let url = request.resolve(canvas_width, device_pixel_ratio)?;
        self.load_texture(&url).await
    }

    /// Model, environment and optional background, joined
    pub async fn load_initial(
        &self,
        model: &str,
        environment: &[String; 6],
        background: Option<&str>,
    ) -> Result<InitialAssets, LoadError> {
        let background = async {
            match background {
                Some(url) => self.load_texture(url).await.map(Some),
                None => Ok(None),
            }
        };

        let (model, environment, background) = futures::try_join!(
            self.load_model(model),
            self.load_environment(environment),
            background
        )?;

        Ok(InitialAssets {
            model,
            environment,
            background,
        })
    }
}

impl std::fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetLoader").finish_non_exhaustive()
    }
}
