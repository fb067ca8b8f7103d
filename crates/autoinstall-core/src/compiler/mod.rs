//! A small module bundler that hosts the auto-install plugin.
//!
//! The compiler walks the import graph from an entry file, resolving every
//! request through its resolvers and giving plugins a chance to act first.
//! It records what it found in a JSON manifest written to its output
//! filesystem.
//!
//! ## Usage
//!
//! ```ignore
//! use autoinstall_core::compiler::{Compiler, CompilerOptions};
//!
//! let mut compiler = Compiler::new(CompilerOptions::new(root, "src/index.js"))
//!     .plugin(Box::new(AutoInstallPlugin::new(&root, overrides)));
//! compiler.watch_run().await?;
//! let stats = compiler.run().await?;
//! ```

mod output;
mod plugin;
mod resolve;
mod scan;

pub use output::{DiskFs, MemoryFs, OutputFileSystem};
pub use plugin::{HookResult, Plugin, PluginError, ResolutionRequest, ResolveKind};
pub use resolve::{
    BundlerResolvers, NodeResolvers, ResolveContext, ResolveError, Resolver, ResolverCall,
    ResolverContract,
};
pub use scan::{scan_imports, ParsedRequest};

use crate::error::Error;
use crate::installer::is_builtin;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Resolver generation this compiler speaks unless told otherwise.
pub const DEFAULT_BUNDLER_VERSION: &str = "3.0.0";

/// Default manifest location, relative to the project root.
pub const DEFAULT_OUTPUT: &str = "dist/autoinstall-manifest.json";

/// File extensions whose imports are followed.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "tsx"];

/// Compiler options.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Project root.
    pub context: PathBuf,
    /// Entry file (relative to `context` unless absolute).
    pub entry: PathBuf,
    /// Manifest path (relative to `context` unless absolute).
    pub output: PathBuf,
    /// Requests left unbundled. `Some` enables the externals hook even when empty.
    pub externals: Option<Vec<String>>,
    /// Version string that selects the resolver call contract.
    pub bundler_version: String,
}

impl CompilerOptions {
    pub fn new(context: impl Into<PathBuf>, entry: impl Into<PathBuf>) -> Self {
        Self {
            context: context.into(),
            entry: entry.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            externals: None,
            bundler_version: DEFAULT_BUNDLER_VERSION.to_string(),
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    #[must_use]
    pub fn with_externals(mut self, externals: Vec<String>) -> Self {
        self.externals = Some(externals);
        self
    }

    #[must_use]
    pub fn with_bundler_version(mut self, version: impl Into<String>) -> Self {
        self.bundler_version = version.into();
        self
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.context.join(path)
        }
    }
}

/// What one compilation saw.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    /// Modules included, in discovery order.
    pub modules: Vec<String>,
    /// Requests left external.
    pub externals: Vec<String>,
    /// Resolution and read errors.
    pub errors: Vec<String>,
}

impl Stats {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The compiler.
pub struct Compiler {
    options: CompilerOptions,
    plugins: Vec<Box<dyn Plugin>>,
    resolvers: Arc<dyn BundlerResolvers>,
    output_fs: Arc<dyn OutputFileSystem>,
    applied: bool,
}

impl Compiler {
    /// Create a compiler with fresh resolvers and disk output.
    #[must_use]
    pub fn new(options: CompilerOptions) -> Self {
        let contract = ResolverContract::for_version(&options.bundler_version)
            .unwrap_or(ResolverContract::Contextual);
        Self {
            options,
            plugins: Vec::new(),
            resolvers: Arc::new(NodeResolvers::new(contract)),
            output_fs: Arc::new(DiskFs),
            applied: false,
        }
    }

    /// Add a plugin.
    #[must_use]
    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Replace the output filesystem.
    #[must_use]
    pub fn with_output_fs(mut self, fs: Arc<dyn OutputFileSystem>) -> Self {
        self.output_fs = fs;
        self
    }

    /// Replace the resolvers.
    #[must_use]
    pub fn with_resolvers(mut self, resolvers: Arc<dyn BundlerResolvers>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Version string of this bundler.
    pub fn version(&self) -> &str {
        &self.options.bundler_version
    }

    pub fn resolvers(&self) -> Arc<dyn BundlerResolvers> {
        Arc::clone(&self.resolvers)
    }

    /// Run `apply` and `after_resolvers` on every plugin, once.
    fn apply_plugins(&mut self) -> Result<(), Error> {
        if self.applied {
            return Ok(());
        }
        for plugin in &self.plugins {
            plugin.apply(self)?;
        }
        for plugin in &self.plugins {
            plugin.after_resolvers(&self.resolvers);
        }
        self.applied = true;
        Ok(())
    }

    /// Fire the watch-run hooks. Returns when every plugin has signalled it is done.
    pub async fn watch_run(&mut self) -> Result<(), Error> {
        self.apply_plugins()?;
        for plugin in &self.plugins {
            plugin.watch_run().await?;
        }
        Ok(())
    }

    /// Compile once.
    pub async fn run(&mut self) -> Result<Stats, Error> {
        self.apply_plugins()?;
        let contract = ResolverContract::for_version(&self.options.bundler_version)?;

        let mut stats = Stats::default();
        let mut queue = VecDeque::from([self.options.absolute(&self.options.entry)]);
        let mut seen = HashSet::new();

        while let Some(file) = queue.pop_front() {
            if !seen.insert(file.clone()) {
                continue;
            }
            let source = match tokio::fs::read_to_string(&file).await {
                Ok(source) => source,
                Err(e) => {
                    stats
                        .errors
                        .push(format!("Can't read '{}': {e}", file.display()));
                    continue;
                }
            };
            stats.modules.push(file.display().to_string());

            let context = file
                .parent()
                .map_or_else(|| self.options.context.clone(), Path::to_path_buf);

            for raw in scan_imports(&source) {
                if let Some(next) = self.process_request(contract, &context, &raw, &mut stats).await
                {
                    queue.push_back(next);
                }
            }
        }

        debug!(
            modules = stats.modules.len(),
            errors = stats.errors.len(),
            "Compilation finished"
        );
        self.emit(&stats)?;
        Ok(stats)
    }

    /// Handle one import. Returns a file to follow, if any.
    async fn process_request(
        &self,
        contract: ResolverContract,
        context: &Path,
        raw: &str,
        stats: &mut Stats,
    ) -> Option<PathBuf> {
        let parsed = ParsedRequest::parse(raw);

        if let Some(externals) = &self.options.externals {
            for plugin in &self.plugins {
                plugin.resolve_external(context, raw).await;
            }
            if externals.iter().any(|e| *e == parsed.resource) {
                stats.externals.push(raw.to_string());
                return None;
            }
        }

        for loader in &parsed.loaders {
            let request = ResolutionRequest::new(context, loader.as_str(), ResolveKind::Loader);
            for plugin in &self.plugins {
                plugin.resolve_loader(&request).await;
            }
            if let Err(e) = contract.invoke(self.resolvers.as_ref(), &request).await {
                stats.errors.push(e.to_string());
            }
        }

        if is_builtin(&parsed.resource) {
            return None;
        }

        let request = ResolutionRequest::new(context, parsed.resource, ResolveKind::Normal);
        for plugin in &self.plugins {
            plugin.resolve_module(&request).await;
        }
        match contract.invoke(self.resolvers.as_ref(), &request).await {
            Ok(path) => {
                let follow = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e));
                if follow {
                    Some(path)
                } else {
                    stats.modules.push(path.display().to_string());
                    None
                }
            }
            Err(e) => {
                stats.errors.push(e.to_string());
                None
            }
        }
    }

    fn emit(&self, stats: &Stats) -> Result<(), Error> {
        let output = self.options.absolute(&self.options.output);
        if let Some(parent) = output.parent() {
            self.output_fs.create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(stats).map_err(|e| Error::other(e.to_string()))?;
        self.output_fs.write(&output, &json)?;
        Ok(())
    }
}
