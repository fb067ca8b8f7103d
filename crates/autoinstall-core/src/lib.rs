#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod compiler;
pub mod config;
pub mod error;
pub mod install;
pub mod installer;
pub mod options;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use install::{
    normalize_loader, package_from_error, AutoInstallPlugin, Dispatch, InstallCoordinator,
    Interception, PreCompilePass, ResolutionInterceptor,
};
pub use installer::{InstallError, InstallOptions, InstallSpec, Installer, PackageManager};
pub use options::{AutoInstallOptions, DevPolicy, OptionsOverride};
pub use version::VERSION;
