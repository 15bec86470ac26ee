use thiserror::Error;

/// Failure fetching or decoding an asset
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("invalid environment map: {0}")]
    InvalidEnvironment(String),
}

impl LoadError {
    pub fn decode(url: impl Into<String>, reason: impl ToString) -> Self {
        LoadError::Decode {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// URL of the asset that failed, if the error is tied to one
    pub fn url(&self) -> Option<&str> {
        match self {
            LoadError::Network { url, .. } | LoadError::Decode { url, .. } => Some(url),
            LoadError::InvalidEnvironment(_) => None,
        }
    }
}

/// Failure issuing GPU work for a frame
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("surface unavailable: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("unknown resource {0:?}")]
    UnknownResource(crate::gpu::ResourceId),

    #[error("renderer already disposed")]
    Disposed,
}

/// Failure reading a scene configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scene configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
