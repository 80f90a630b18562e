//! Code unit loading.
//!
//! # Responsibilities
//! - Map an entry/controller path to a compiled-in unit
//! - Cache loaded units until invalidated
//!
//! # Design Decisions
//! - Units register under their path relative to the projects root
//!   (e.g. `blog/server/entry-server.js`); the file still has to exist for
//!   resolution, the registry only supplies the code
//! - Initialization runs lazily on first load, then the unit is cached
//! - A dev instance may supply its own loader; the dispatcher prefers it

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::dispatch::contract::{ControllerFactory, Renderer};
use crate::dispatch::error::DispatchError;

/// A loaded code unit.
#[derive(Clone)]
pub enum Module {
    Renderer(Arc<dyn Renderer>),
    Controller(Arc<dyn ControllerFactory>),
}

#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Module, DispatchError>;

    async fn load_renderer(&self, path: &Path) -> Result<Arc<dyn Renderer>, DispatchError> {
        match self.load(path).await? {
            Module::Renderer(renderer) => Ok(renderer),
            Module::Controller(_) => Err(DispatchError::load(path, "module does not export a renderer")),
        }
    }

    async fn load_controller(&self, path: &Path) -> Result<Arc<dyn ControllerFactory>, DispatchError> {
        match self.load(path).await? {
            Module::Controller(factory) => Ok(factory),
            Module::Renderer(_) => Err(DispatchError::load(path, "module does not export a controller")),
        }
    }
}

type ModuleInit = Arc<dyn Fn() -> Result<Module, DispatchError> + Send + Sync>;

/// Path-keyed table of compiled-in units with a load cache.
#[derive(Default)]
pub struct ModuleRegistry {
    root: PathBuf,
    sources: HashMap<String, ModuleInit>,
    loaded: DashMap<PathBuf, Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory registered paths are relative to.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self.loaded.clear();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a lazily initialized unit.
    pub fn register<F>(&mut self, path: &str, init: F) -> &mut Self
    where
        F: Fn() -> Result<Module, DispatchError> + Send + Sync + 'static,
    {
        self.sources.insert(normalize(Path::new(path)), Arc::new(init));
        self
    }

    pub fn renderer(&mut self, path: &str, renderer: impl Renderer + 'static) -> &mut Self {
        let renderer: Arc<dyn Renderer> = Arc::new(renderer);
        self.register(path, move || Ok(Module::Renderer(renderer.clone())))
    }

    pub fn controller(&mut self, path: &str, factory: impl ControllerFactory + 'static) -> &mut Self {
        let factory: Arc<dyn ControllerFactory> = Arc::new(factory);
        self.register(path, move || Ok(Module::Controller(factory.clone())))
    }

    /// Drop the cached unit for `path`. Returns whether one was cached.
    pub fn invalidate(&self, path: &Path) -> bool {
        if self.loaded.remove(path).is_some() {
            return true;
        }
        // Watchers may report absolute paths for a relative root.
        let Some(key) = self.key_for(path) else {
            return false;
        };
        let before = self.loaded.len();
        self.loaded.retain(|cached, _| self.key_for(cached).as_deref() != Some(key.as_str()));
        self.loaded.len() != before
    }

    pub fn clear(&self) {
        self.loaded.clear();
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn registered_count(&self) -> usize {
        self.sources.len()
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(normalize(rel));
        }
        let root = std::fs::canonicalize(&self.root).ok()?;
        let path = std::fs::canonicalize(path).ok()?;
        path.strip_prefix(&root).ok().map(normalize)
    }
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    async fn load(&self, path: &Path) -> Result<Module, DispatchError> {
        if let Some(module) = self.loaded.get(path) {
            return Ok(module.clone());
        }

        let key = self
            .key_for(path)
            .ok_or_else(|| DispatchError::load(path, "outside the projects root"))?;
        let init = self
            .sources
            .get(&key)
            .ok_or_else(|| DispatchError::load(path, "no module registered for this path"))?;

        let module = init()?;
        tracing::debug!(module = %key, "Module loaded");
        self.loaded.insert(path.to_path_buf(), module.clone());
        Ok(module)
    }
}

fn normalize(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
