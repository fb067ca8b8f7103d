//! Plugin hooks exposed by the compiler.
//!
//! Hooks mirror the points where the compiler hands control to plugins:
//!
//! - `apply`: once, before the first compilation (sync)
//! - `after_resolvers`: once, after the resolvers are set up (sync)
//! - `watch_run`: before each compilation in watch mode (async)
//! - `resolve_external` / `resolve_loader` / `resolve_module`: before the
//!   compiler resolves a request of that kind (async)
//!
//! Async hooks return a future; completing the future is the signal that the
//! compiler may continue.

#![allow(clippy::unused_self)]

use super::resolve::BundlerResolvers;
use super::Compiler;
use crate::error::Error;
use futures::future::{self, BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// Error from a plugin.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Which resolver a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveKind {
    /// Regular module import.
    Normal,
    /// Transform-pipeline loader.
    Loader,
    /// Request the compiler leaves unbundled.
    External,
}

/// One resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Directory of the importing module.
    pub context: PathBuf,
    /// Raw import specifier.
    pub request: String,
    pub kind: ResolveKind,
}

impl ResolutionRequest {
    pub fn new(context: impl Into<PathBuf>, request: impl Into<String>, kind: ResolveKind) -> Self {
        Self {
            context: context.into(),
            request: request.into(),
            kind,
        }
    }
}

/// The plugin trait.
///
/// All hooks have no-op defaults; implement the ones you need.
pub trait Plugin: Send + Sync {
    /// Plugin name for debugging and error messages.
    fn name(&self) -> &str;

    /// Called once before the first compilation.
    fn apply(&self, _compiler: &Compiler) -> Result<(), Error> {
        Ok(())
    }

    /// Called once the compiler's resolvers exist.
    fn after_resolvers(&self, _resolvers: &Arc<dyn BundlerResolvers>) {}

    /// Called before each watch-mode compilation.
    fn watch_run<'a>(&'a self) -> BoxFuture<'a, HookResult<()>> {
        future::ready(Ok(())).boxed()
    }

    /// Called for every request when the compiler has externals configured.
    fn resolve_external<'a>(&'a self, _context: &'a Path, _request: &'a str) -> BoxFuture<'a, ()> {
        future::ready(()).boxed()
    }

    /// Called before a loader is resolved.
    fn resolve_loader<'a>(&'a self, _request: &'a ResolutionRequest) -> BoxFuture<'a, ()> {
        future::ready(()).boxed()
    }

    /// Called before a module is resolved.
    fn resolve_module<'a>(&'a self, _request: &'a ResolutionRequest) -> BoxFuture<'a, ()> {
        future::ready(()).boxed()
    }
}
