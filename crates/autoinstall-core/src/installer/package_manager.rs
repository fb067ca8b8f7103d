//! Package manager invocation.

use super::{find_installed, package_name, InstallError, InstallOptions, InstallSpec, Installer};
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManager {
    /// Pick a package manager from the lockfiles present in `root`.
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        if root.join("yarn.lock").is_file() {
            Self::Yarn
        } else if root.join("pnpm-lock.yaml").is_file() {
            Self::Pnpm
        } else {
            Self::Npm
        }
    }

    /// Executable name.
    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }

    /// Build the argument list that installs `packages`.
    #[must_use]
    pub fn install_args(self, packages: &[String], options: &InstallOptions) -> Vec<String> {
        let mut args: Vec<String> = match self {
            Self::Npm => vec!["install".into()],
            Self::Yarn | Self::Pnpm => vec!["add".into()],
        };

        match (self, options.dev) {
            (Self::Npm, false) => args.push("--save".into()),
            (Self::Npm | Self::Pnpm, true) => args.push("--save-dev".into()),
            (Self::Yarn, true) => args.push("--dev".into()),
            (Self::Yarn | Self::Pnpm, false) => {}
        }

        if options.quiet {
            args.push("--silent".into());
        }

        args.extend(options.extra_args.iter().cloned());
        args.extend(packages.iter().cloned());
        args
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "npm" => Ok(Self::Npm),
            "yarn" => Ok(Self::Yarn),
            "pnpm" => Ok(Self::Pnpm),
            other => Err(format!("unknown package manager '{other}'")),
        }
    }
}

/// Installer that runs a real package manager in the project root.
#[derive(Debug, Clone)]
pub struct PackageManagerInstaller {
    root: PathBuf,
}

impl PackageManagerInstaller {
    /// Create an installer operating on the project at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Installer for PackageManagerInstaller {
    fn check(&self, request: &str) -> Option<String> {
        let name = package_name(request)?;
        if let Some(dir) = find_installed(&self.root, name) {
            debug!(package = %name, path = %dir.display(), "Already installed");
            return None;
        }
        Some(name.to_string())
    }

    fn install(&self, spec: InstallSpec) -> BoxFuture<'static, Result<(), InstallError>> {
        let root = self.root.clone();
        async move {
            let manager = spec
                .options
                .package_manager
                .unwrap_or_else(|| PackageManager::detect(&root));

            run_install(&root, manager, &[spec.package.clone()], &spec.options).await?;

            if spec.options.peer_dependencies {
                let peers = missing_peers(&root, &spec.package)?;
                if !peers.is_empty() {
                    let options = InstallOptions {
                        peer_dependencies: false,
                        ..spec.options.clone()
                    };
                    run_install(&root, manager, &peers, &options).await?;
                }
            }

            Ok(())
        }
        .boxed()
    }
}

async fn run_install(
    root: &Path,
    manager: PackageManager,
    packages: &[String],
    options: &InstallOptions,
) -> Result<(), InstallError> {
    let program = manager.program();
    let args = manager.install_args(packages, options);
    info!(packages = %packages.join(" "), manager = program, "Installing");

    let status = Command::new(program)
        .args(&args)
        .current_dir(root)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| InstallError::spawn_failed(program, &e))?;

    if !status.success() {
        warn!(packages = %packages.join(" "), %status, "Install failed");
        return Err(InstallError::exit_status(program, status));
    }
    Ok(())
}

/// Peer dependencies of an installed package that are not installed yet,
/// formatted as `name@range`.
fn missing_peers(root: &Path, package: &str) -> Result<Vec<String>, InstallError> {
    let Some(pkg_dir) = find_installed(root, package) else {
        return Ok(Vec::new());
    };
    let manifest = pkg_dir.join("package.json");
    let content = std::fs::read_to_string(&manifest).map_err(|e| {
        InstallError::manifest_invalid(format!("{}: {e}", manifest.display()))
    })?;
    let json: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        InstallError::manifest_invalid(format!("{}: {e}", manifest.display()))
    })?;

    let Some(peers) = json.get("peerDependencies").and_then(|v| v.as_object()) else {
        return Ok(Vec::new());
    };

    let mut missing: Vec<String> = peers
        .iter()
        .filter(|(name, _)| find_installed(root, name).is_none())
        .map(|(name, range)| match range.as_str() {
            Some(range) if !range.is_empty() => format!("{name}@{range}"),
            _ => name.clone(),
        })
        .collect();
    missing.sort();
    Ok(missing)
}
