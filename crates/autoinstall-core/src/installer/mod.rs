//! The installer collaborator.
//!
//! The core never talks to a package manager directly. It asks an
//! [`Installer`] two things:
//! - `check`: is this request a package that is genuinely missing?
//! - `install`: install it (asynchronously, reporting failure via the result)
//!
//! [`PackageManagerInstaller`] is the production implementation that shells
//! out to `npm`, `yarn`, or `pnpm`.

pub mod babel;
mod package_manager;

pub use package_manager::{PackageManager, PackageManagerInstaller};

use crate::options::AutoInstallOptions;
use futures::future::BoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};

/// Installer error codes.
pub mod codes {
    pub const INSTALL_SPAWN_FAILED: &str = "INSTALL_SPAWN_FAILED";
    pub const INSTALL_EXIT_STATUS: &str = "INSTALL_EXIT_STATUS";
    pub const INSTALL_MANIFEST_INVALID: &str = "INSTALL_MANIFEST_INVALID";
}

/// Directory name of the installed-packages tree.
pub const DEPENDENCY_TREE_DIR: &str = "node_modules";

/// Node core modules. These resolve without being installed.
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

/// Error reported by an install attempt.
#[derive(Debug)]
pub struct InstallError {
    code: &'static str,
    message: String,
}

impl InstallError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The package manager could not be started.
    pub fn spawn_failed(program: &str, err: &std::io::Error) -> Self {
        Self::new(
            codes::INSTALL_SPAWN_FAILED,
            format!("Failed to run {program}: {err}"),
        )
    }

    /// The package manager ran but reported failure.
    pub fn exit_status(program: &str, status: std::process::ExitStatus) -> Self {
        Self::new(
            codes::INSTALL_EXIT_STATUS,
            format!("{program} exited with {status}"),
        )
    }

    /// An installed package's manifest could not be read.
    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_MANIFEST_INVALID, msg)
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for InstallError {}

/// Options handed to the installer for one package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstallOptions {
    /// Save as a devDependency instead of a dependency.
    pub dev: bool,
    /// Also install missing peerDependencies of the package.
    pub peer_dependencies: bool,
    /// Ask the package manager to be quiet.
    pub quiet: bool,
    /// Package manager to use (`None` = detect from lockfiles).
    pub package_manager: Option<PackageManager>,
    /// Extra arguments passed through to the package manager.
    pub extra_args: Vec<String>,
}

/// One install decision. Immutable once handed to the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSpec {
    /// Canonical package name (e.g. `lodash`, `@cycle/core`).
    pub package: String,
    pub options: InstallOptions,
}

/// Installer collaborator used by the install coordinator.
pub trait Installer: Send + Sync {
    /// Decide whether `request` names a package that should be installed.
    ///
    /// Returns the canonical package name, or `None` when the request is a
    /// local path, not a valid package name, or already installed.
    fn check(&self, request: &str) -> Option<String>;

    /// Install a package. Must not panic; failures are reported through the
    /// returned result.
    fn install(&self, spec: InstallSpec) -> BoxFuture<'static, Result<(), InstallError>>;

    /// Defaults that caller overrides are merged onto.
    fn default_options(&self) -> AutoInstallOptions {
        AutoInstallOptions::default()
    }
}

/// Reduce an import request to the name of the package that provides it.
///
/// - `lodash` → `lodash`
/// - `lodash.random` → `lodash.random`
/// - `bootswatch/lumen/bootstrap.css` → `bootswatch`
/// - `@cycle/core/lib/x` → `@cycle/core`
///
/// Relative and absolute paths, Node core modules, and malformed names
/// yield `None`.
#[must_use]
pub fn package_name(request: &str) -> Option<&str> {
    let request = request.trim();
    if request.is_empty()
        || request.starts_with('.')
        || request.starts_with('/')
        || Path::new(request).is_absolute()
        || is_builtin(request)
    {
        return None;
    }

    let name = if request.starts_with('@') {
        let mut parts = request.splitn(3, '/');
        let scope = parts.next()?;
        let pkg = parts.next()?;
        if scope.len() < 2 || pkg.is_empty() {
            return None;
        }
        &request[..scope.len() + 1 + pkg.len()]
    } else {
        request.split('/').next()?
    };

    let bare = name.rsplit('/').next()?;
    let first = bare.chars().next()?;
    if !first.is_ascii_alphanumeric() {
        return None;
    }
    let valid = name
        .trim_start_matches('@')
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '/'));
    valid.then_some(name)
}

/// Whether `request` names a Node core module.
#[must_use]
pub fn is_builtin(request: &str) -> bool {
    if request.starts_with("node:") {
        return true;
    }
    let head = request.split('/').next().unwrap_or(request);
    NODE_BUILTINS.contains(&head)
}

/// Find an installed package by walking up from `root` through `node_modules`
/// directories.
#[must_use]
pub fn find_installed(root: &Path, name: &str) -> Option<PathBuf> {
    root.ancestors()
        .map(|dir| dir.join(DEPENDENCY_TREE_DIR).join(name))
        .find(|pkg_dir| pkg_dir.join("package.json").is_file())
}
