//! Plugin options.
//!
//! Options are built once, when the plugin is constructed, by merging caller
//! overrides onto the installer's defaults. They are immutable afterwards.

use crate::error::Error;
use crate::installer::{InstallOptions, PackageManager};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file looked up in the project root.
pub const CONFIG_FILE: &str = "autoinstall.config.json";

/// Decision function for dev-vs-prod classification: `(request, path) -> dev`.
pub type DevDecider = Arc<dyn Fn(&str, &Path) -> bool + Send + Sync>;

/// How installed packages are classified.
#[derive(Clone)]
pub enum DevPolicy {
    /// Every install is saved the same way.
    Fixed(bool),
    /// Decide per request, from the requested name and the importing directory.
    Decide(DevDecider),
}

impl DevPolicy {
    /// Build a policy from a closure.
    pub fn decide(f: impl Fn(&str, &Path) -> bool + Send + Sync + 'static) -> Self {
        Self::Decide(Arc::new(f))
    }

    /// Classify one install.
    #[must_use]
    pub fn is_dev(&self, request: &str, path: &Path) -> bool {
        match self {
            Self::Fixed(dev) => *dev,
            Self::Decide(f) => f(request, path),
        }
    }
}

impl Default for DevPolicy {
    fn default() -> Self {
        Self::Fixed(false)
    }
}

impl fmt::Debug for DevPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(dev) => f.debug_tuple("Fixed").field(dev).finish(),
            Self::Decide(_) => f.write_str("Decide(<fn>)"),
        }
    }
}

/// Resolved plugin options.
#[derive(Debug, Clone)]
pub struct AutoInstallOptions {
    pub dev: DevPolicy,
    pub peer_dependencies: bool,
    pub quiet: bool,
    /// `None` detects the package manager from lockfiles.
    pub package_manager: Option<PackageManager>,
    pub extra_args: Vec<String>,
}

impl Default for AutoInstallOptions {
    fn default() -> Self {
        Self {
            dev: DevPolicy::default(),
            peer_dependencies: true,
            quiet: false,
            package_manager: None,
            extra_args: Vec::new(),
        }
    }
}

impl AutoInstallOptions {
    /// Merge `overrides` onto `defaults`. Fields absent from the overrides
    /// keep their default.
    #[must_use]
    pub fn merged(defaults: Self, overrides: OptionsOverride) -> Self {
        let mut extra_args = defaults.extra_args;
        extra_args.extend(overrides.extra_args);
        Self {
            dev: overrides.dev.map_or(defaults.dev, DevPolicy::Fixed),
            peer_dependencies: overrides
                .peer_dependencies
                .unwrap_or(defaults.peer_dependencies),
            quiet: overrides.quiet.unwrap_or(defaults.quiet),
            package_manager: overrides.package_manager.or(defaults.package_manager),
            extra_args,
        }
    }

    /// Replace the dev classification policy.
    #[must_use]
    pub fn with_dev_policy(mut self, dev: DevPolicy) -> Self {
        self.dev = dev;
        self
    }

    /// Options for installing one package requested from `path`.
    #[must_use]
    pub fn install_options(&self, request: &str, path: &Path) -> InstallOptions {
        InstallOptions {
            dev: self.dev.is_dev(request, path),
            peer_dependencies: self.peer_dependencies,
            quiet: self.quiet,
            package_manager: self.package_manager,
            extra_args: self.extra_args.clone(),
        }
    }
}

/// Caller-supplied overrides, from a config file or CLI flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OptionsOverride {
    pub dev: Option<bool>,
    pub peer_dependencies: Option<bool>,
    pub quiet: Option<bool>,
    pub package_manager: Option<PackageManager>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl OptionsOverride {
    /// Load overrides from `autoinstall.config.json` in `root`, if present.
    pub fn load(root: &Path) -> Result<Option<Self>, Error> {
        let path: PathBuf = root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let parsed =
            serde_json::from_str(&content).map_err(|source| Error::ConfigParse { path, source })?;
        Ok(Some(parsed))
    }

    /// Layer `other` on top of `self`; set fields in `other` win.
    #[must_use]
    pub fn layer(self, other: Self) -> Self {
        let mut extra_args = self.extra_args;
        extra_args.extend(other.extra_args);
        Self {
            dev: other.dev.or(self.dev),
            peer_dependencies: other.peer_dependencies.or(self.peer_dependencies),
            quiet: other.quiet.or(self.quiet),
            package_manager: other.package_manager.or(self.package_manager),
            extra_args,
        }
    }
}
