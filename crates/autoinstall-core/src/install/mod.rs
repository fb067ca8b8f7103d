//! Missing-dependency auto-install.
//!
//! [`AutoInstallPlugin`] hooks the compiler's resolution. A failed resolution
//! is reduced to a package name ([`package_from_error`], [`normalize_loader`])
//! and handed to an [`InstallCoordinator`], which starts at most one install
//! per name. [`PreCompilePass`] runs a throwaway nested build before each
//! watch compilation so missing packages are installed ahead of the real one.

mod coordinator;
mod extract;
mod interceptor;
mod loader;
mod plugin;
mod precompile;

pub use coordinator::{Dispatch, InstallCoordinator};
pub use extract::package_from_error;
pub use interceptor::{
    has_special_syntax, is_dependency_context, Interception, ResolutionInterceptor,
};
pub use loader::{normalize_loader, LOADER_SUFFIX};
pub use plugin::{AutoInstallPlugin, PLUGIN_NAME};
pub use precompile::PreCompilePass;
