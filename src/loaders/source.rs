use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture};

use crate::error::LoadError;

/// Where asset bytes come from
///
/// Fetches are the only suspension points of a scene. Returned futures own
/// everything they need so the host executor can hold them past the call.
pub trait AssetSource {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>>;
}

/// Reads assets relative to a root directory
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for FsSource {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>> {
        let path = self.root.join(url.trim_start_matches('/'));
        let url = url.to_string();
        async move {
            log::debug!("reading {}", path.display());
            std::fs::read(&path).map_err(|source| LoadError::Network { url, source })
        }
        .boxed_local()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Vec<u8>>,
    fetches: HashMap<String, usize>,
}

/// In-memory asset table
///
/// Cloning is cheap (Rc); clones share entries and fetch counters.
#[derive(Debug, Clone, Default)]
pub struct MemorySource(Rc<RefCell<MemoryState>>);

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.0.borrow_mut().entries.insert(url.into(), bytes);
    }

    pub fn with(self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }

    /// How many times `url` was requested
    pub fn fetch_count(&self, url: &str) -> usize {
        self.0.borrow().fetches.get(url).copied().unwrap_or(0)
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>> {
        let mut state = self.0.borrow_mut();
        *state.fetches.entry(url.to_string()).or_default() += 1;

        let result = state.entries.get(url).cloned().ok_or_else(|| LoadError::Network {
            url: url.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such asset"),
        });
        future::ready(result).boxed_local()
    }
}
