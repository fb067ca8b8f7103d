//! Resolution interception.
//!
//! Each hook resolves the request itself through the bundler's resolvers.
//! A failure is turned into a package name and handed to the coordinator;
//! the bundler then performs its own resolution as usual, so the outcome it
//! sees is never altered.

use super::coordinator::{Dispatch, InstallCoordinator};
use super::extract::package_from_error;
use super::loader::normalize_loader;
use crate::compiler::{BundlerResolvers, ResolutionRequest, ResolveKind, ResolverContract};
use crate::installer::DEPENDENCY_TREE_DIR;
use crate::options::AutoInstallOptions;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Outcome of one intercepted resolution.
#[derive(Debug)]
pub enum Interception {
    /// The importer lives inside the installed-packages tree.
    DependencyContext,
    /// The request uses inline-loader or query syntax.
    SpecialSyntax,
    /// The same request is already being resolved by this interceptor.
    Reentrant,
    /// The request resolved; nothing to do.
    Resolved(PathBuf),
    /// The request failed to resolve and was routed to the coordinator.
    Failed(Dispatch),
}

/// Marks a request as being resolved until dropped.
struct Resolving<'a> {
    set: &'a Mutex<HashSet<String>>,
    request: String,
}

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.request);
        }
    }
}

/// Watches resolution attempts and dispatches installs for missing packages.
pub struct ResolutionInterceptor {
    coordinator: InstallCoordinator,
    options: Arc<AutoInstallOptions>,
    contract: ResolverContract,
    resolvers: Arc<dyn BundlerResolvers>,
    resolving: Mutex<HashSet<String>>,
}

impl ResolutionInterceptor {
    pub fn new(
        coordinator: InstallCoordinator,
        options: Arc<AutoInstallOptions>,
        contract: ResolverContract,
        resolvers: Arc<dyn BundlerResolvers>,
    ) -> Self {
        Self {
            coordinator,
            options,
            contract,
            resolvers,
            resolving: Mutex::new(HashSet::new()),
        }
    }

    /// Requests the bundler leaves external.
    pub async fn resolve_external(&self, context: &Path, request: &str) -> Interception {
        if is_dependency_context(context) {
            return Interception::DependencyContext;
        }
        if has_special_syntax(request) {
            return Interception::SpecialSyntax;
        }

        let attempt = ResolutionRequest::new(context, request, ResolveKind::External);
        match self.contract.invoke(self.resolvers.as_ref(), &attempt).await {
            Ok(path) => Interception::Resolved(path),
            Err(err) => {
                let name = package_from_error(&err.to_string());
                Interception::Failed(self.dispatch(name, context))
            }
        }
    }

    /// Loader requests. Failures are installed under the normalized loader name.
    pub async fn resolve_loader(&self, request: &ResolutionRequest) -> Interception {
        self.intercept(request, |_, req| Some(normalize_loader(req)))
            .await
    }

    /// Normal module requests.
    pub async fn resolve_module(&self, request: &ResolutionRequest) -> Interception {
        self.intercept(request, |message, _| package_from_error(message))
            .await
    }

    async fn intercept(
        &self,
        request: &ResolutionRequest,
        to_package: impl Fn(&str, &str) -> Option<String>,
    ) -> Interception {
        if is_dependency_context(&request.context) {
            return Interception::DependencyContext;
        }
        let Some(_resolving) = self.enter(&request.request) else {
            return Interception::Reentrant;
        };

        match self.contract.invoke(self.resolvers.as_ref(), request).await {
            Ok(path) => Interception::Resolved(path),
            Err(err) => {
                debug!(
                    request = %request.request,
                    kind = ?request.kind,
                    "Resolution failed: {err}"
                );
                let name = to_package(&err.to_string(), &request.request);
                Interception::Failed(self.dispatch(name, &request.context))
            }
        }
    }

    fn enter(&self, request: &str) -> Option<Resolving<'_>> {
        let mut set = self.resolving.lock().ok()?;
        if !set.insert(request.to_string()) {
            return None;
        }
        Some(Resolving {
            set: &self.resolving,
            request: request.to_string(),
        })
    }

    /// The dev policy sees the failed request as extracted, before it is
    /// reduced to a package name.
    fn dispatch(&self, name: Option<String>, context: &Path) -> Dispatch {
        let Some(request) = name else {
            return Dispatch::Skipped;
        };
        let Some(package) = self.coordinator.check(Some(&request)) else {
            return Dispatch::Skipped;
        };
        let options = self.options.install_options(&request, context);
        self.coordinator.install(Some(package), options)
    }
}

/// Whether `context` lies inside an installed-packages tree.
#[must_use]
pub fn is_dependency_context(context: &Path) -> bool {
    context
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == DEPENDENCY_TREE_DIR))
}

/// Whether `request` carries inline-loader (`!`) or query (`?`) syntax.
#[must_use]
pub fn has_special_syntax(request: &str) -> bool {
    request.contains(['!', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ResolveError, ResolverCall};
    use crate::installer::{InstallError, InstallSpec, Installer};
    use futures::future::{self, BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolvers that fail every request with the bundler's message.
    #[derive(Default)]
    struct FailingResolvers {
        calls: AtomicUsize,
    }

    impl BundlerResolvers for FailingResolvers {
        fn resolve(
            &self,
            _kind: ResolveKind,
            call: ResolverCall<'_>,
        ) -> BoxFuture<'static, Result<PathBuf, ResolveError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let err = ResolveError {
                specifier: call.request().to_string(),
                from: call.path().display().to_string(),
                message: "Cannot find package".to_string(),
            };
            future::ready(Err(err)).boxed()
        }
    }

    #[derive(Default)]
    struct RecordingInstaller {
        installed: Mutex<Vec<InstallSpec>>,
    }

    impl Installer for RecordingInstaller {
        fn check(&self, request: &str) -> Option<String> {
            crate::installer::package_name(request).map(str::to_string)
        }

        fn install(&self, spec: InstallSpec) -> BoxFuture<'static, Result<(), InstallError>> {
            self.installed.lock().unwrap().push(spec);
            future::ready(Ok(())).boxed()
        }
    }

    fn interceptor(
        installer: Arc<RecordingInstaller>,
        resolvers: Arc<FailingResolvers>,
    ) -> ResolutionInterceptor {
        ResolutionInterceptor::new(
            InstallCoordinator::new(installer),
            Arc::new(AutoInstallOptions::default()),
            ResolverContract::Contextual,
            resolvers,
        )
    }

    fn installed(installer: &RecordingInstaller) -> Vec<String> {
        installer
            .installed
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.package.clone())
            .collect()
    }

    #[test]
    fn test_dependency_context_detection() {
        assert!(is_dependency_context(Path::new("/proj/node_modules/react/lib")));
        assert!(!is_dependency_context(Path::new("/proj/src")));
        assert!(!is_dependency_context(Path::new("/proj/my_node_modules_copy")));
    }

    #[tokio::test]
    async fn test_dependency_context_is_skipped() {
        let installer = Arc::new(RecordingInstaller::default());
        let resolvers = Arc::new(FailingResolvers::default());
        let interceptor = interceptor(installer.clone(), resolvers.clone());

        let context = Path::new("/proj/node_modules/react-lite/lib");
        let request = ResolutionRequest::new(context, "object-assign", ResolveKind::Normal);
        assert!(matches!(
            interceptor.resolve_module(&request).await,
            Interception::DependencyContext
        ));
        let request = ResolutionRequest::new(context, "babel", ResolveKind::Loader);
        assert!(matches!(
            interceptor.resolve_loader(&request).await,
            Interception::DependencyContext
        ));
        assert!(matches!(
            interceptor.resolve_external(context, "jquery").await,
            Interception::DependencyContext
        ));

        assert_eq!(resolvers.calls.load(Ordering::SeqCst), 0);
        assert!(installed(&installer).is_empty());
    }

    #[tokio::test]
    async fn test_special_syntax_is_skipped_for_externals() {
        let installer = Arc::new(RecordingInstaller::default());
        let resolvers = Arc::new(FailingResolvers::default());
        let interceptor = interceptor(installer.clone(), resolvers.clone());

        for request in ["!!bundle?lazy!./something", "style!css", "lodash?x"] {
            assert!(matches!(
                interceptor.resolve_external(Path::new("/proj/src"), request).await,
                Interception::SpecialSyntax
            ));
        }
        assert_eq!(resolvers.calls.load(Ordering::SeqCst), 0);
        assert!(installed(&installer).is_empty());
    }

    #[tokio::test]
    async fn test_module_failure_dispatches_package() {
        let installer = Arc::new(RecordingInstaller::default());
        let interceptor = interceptor(installer.clone(), Arc::default());

        let request = ResolutionRequest::new(
            "/proj/src",
            "bootswatch/lumen/bootstrap.css",
            ResolveKind::Normal,
        );
        let outcome = interceptor.resolve_module(&request).await;
        assert!(matches!(outcome, Interception::Failed(Dispatch::Started(_))));

        let local = ResolutionRequest::new("/proj/src", "./missing", ResolveKind::Normal);
        assert!(matches!(
            interceptor.resolve_module(&local).await,
            Interception::Failed(Dispatch::Skipped)
        ));

        assert_eq!(installed(&installer), vec!["bootswatch"]);
    }

    #[tokio::test]
    async fn test_loader_failure_installs_normalized_name() {
        let installer = Arc::new(RecordingInstaller::default());
        let interceptor = interceptor(installer.clone(), Arc::default());

        let request =
            ResolutionRequest::new("/proj/src", "babel?cacheDirectory", ResolveKind::Loader);
        interceptor.resolve_loader(&request).await;

        assert_eq!(installed(&installer), vec!["babel-loader"]);
    }

    #[tokio::test]
    async fn test_external_failure_dispatches_package() {
        let installer = Arc::new(RecordingInstaller::default());
        let interceptor = interceptor(installer.clone(), Arc::default());

        interceptor
            .resolve_external(Path::new("/proj/src"), "@cycle/core")
            .await;
        assert_eq!(installed(&installer), vec!["@cycle/core"]);
    }

    #[tokio::test]
    async fn test_reentrant_request_is_skipped() {
        let installer = Arc::new(RecordingInstaller::default());
        let interceptor = interceptor(installer.clone(), Arc::default());

        let guard = interceptor.enter("react-lite");
        assert!(guard.is_some());
        let request = ResolutionRequest::new("/proj/src", "react-lite", ResolveKind::Normal);
        assert!(matches!(
            interceptor.resolve_module(&request).await,
            Interception::Reentrant
        ));

        drop(guard);
        assert!(matches!(
            interceptor.resolve_module(&request).await,
            Interception::Failed(_)
        ));
    }
}
