//! The auto-install plugin.

use super::coordinator::InstallCoordinator;
use super::interceptor::{Interception, ResolutionInterceptor};
use super::precompile::PreCompilePass;
use crate::compiler::{
    BundlerResolvers, Compiler, HookResult, Plugin, ResolutionRequest, ResolverContract,
};
use crate::error::Error;
use crate::installer::{babel, Installer, PackageManagerInstaller};
use crate::options::{AutoInstallOptions, DevPolicy, OptionsOverride};
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, trace};

/// Plugin name reported to the compiler.
pub const PLUGIN_NAME: &str = "autoinstall";

/// Installs missing packages as the compiler discovers them.
///
/// Owns one [`InstallCoordinator`]. The resolver contract is chosen when the
/// plugin is applied, and the interceptor is wired once resolvers exist.
pub struct AutoInstallPlugin {
    options: Arc<AutoInstallOptions>,
    coordinator: InstallCoordinator,
    babel: Vec<String>,
    contract: OnceLock<ResolverContract>,
    interceptor: OnceLock<ResolutionInterceptor>,
    precompile: OnceLock<PreCompilePass>,
}

impl AutoInstallPlugin {
    /// Plugin for the project at `root`, installing with its package manager.
    ///
    /// Reads `.babelrc` so presets and plugins it names are installed when
    /// the plugin is applied.
    pub fn new(root: impl Into<PathBuf>, overrides: OptionsOverride) -> Result<Self, Error> {
        let root = root.into();
        let installer = Arc::new(PackageManagerInstaller::new(root.clone()));
        let options = AutoInstallOptions::merged(installer.default_options(), overrides);
        let babel = babel::babel_dependencies(&root)?;

        let mut plugin = Self::with_installer(installer, options);
        plugin.babel = babel;
        Ok(plugin)
    }

    /// Plugin with a custom installer and already merged options.
    pub fn with_installer(installer: Arc<dyn Installer>, options: AutoInstallOptions) -> Self {
        Self {
            options: Arc::new(options),
            coordinator: InstallCoordinator::new(installer),
            babel: Vec::new(),
            contract: OnceLock::new(),
            interceptor: OnceLock::new(),
            precompile: OnceLock::new(),
        }
    }

    /// Replace the dev classification policy.
    #[must_use]
    pub fn with_dev_policy(mut self, dev: DevPolicy) -> Self {
        self.options = Arc::new((*self.options).clone().with_dev_policy(dev));
        self
    }

    pub fn options(&self) -> &AutoInstallOptions {
        &self.options
    }

    pub fn coordinator(&self) -> &InstallCoordinator {
        &self.coordinator
    }

    /// Contract selected when the plugin was applied.
    pub fn contract(&self) -> Option<ResolverContract> {
        self.contract.get().copied()
    }

    fn install_babel(&self, context: &Path) {
        for dep in &self.babel {
            let package = self.coordinator.check(Some(dep));
            let options = self.options.install_options(dep, context);
            self.coordinator.install(package, options);
        }
    }
}

fn log_outcome(hook: &str, request: &str, outcome: &Interception) {
    match outcome {
        Interception::Failed(dispatch) => {
            debug!(hook, request = %request, ?dispatch, "Resolution failed");
        }
        other => trace!(hook, request = %request, outcome = ?other, "Intercepted"),
    }
}

impl Plugin for AutoInstallPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn apply(&self, compiler: &Compiler) -> Result<(), Error> {
        let contract = ResolverContract::for_version(compiler.version())?;
        let _ = self.contract.set(contract);
        let _ = self.precompile.set(PreCompilePass::new(
            compiler.options().clone(),
            Arc::clone(self.coordinator.installer()),
            Arc::clone(&self.options),
        ));

        if !self.babel.is_empty() {
            info!(count = self.babel.len(), "Checking babel dependencies");
            self.install_babel(&compiler.options().context);
        }
        Ok(())
    }

    fn after_resolvers(&self, resolvers: &Arc<dyn BundlerResolvers>) {
        if let Some(contract) = self.contract.get() {
            let _ = self.interceptor.set(ResolutionInterceptor::new(
                self.coordinator.clone(),
                Arc::clone(&self.options),
                *contract,
                Arc::clone(resolvers),
            ));
        }
    }

    fn watch_run<'a>(&'a self) -> BoxFuture<'a, HookResult<()>> {
        async move {
            if let Some(precompile) = self.precompile.get() {
                precompile.run().await;
            }
            Ok(())
        }
        .boxed()
    }

    fn resolve_external<'a>(&'a self, context: &'a Path, request: &'a str) -> BoxFuture<'a, ()> {
        async move {
            if let Some(interceptor) = self.interceptor.get() {
                let outcome = interceptor.resolve_external(context, request).await;
                log_outcome("resolve_external", request, &outcome);
            }
        }
        .boxed()
    }

    fn resolve_loader<'a>(&'a self, request: &'a ResolutionRequest) -> BoxFuture<'a, ()> {
        async move {
            if let Some(interceptor) = self.interceptor.get() {
                let outcome = interceptor.resolve_loader(request).await;
                log_outcome("resolve_loader", &request.request, &outcome);
            }
        }
        .boxed()
    }

    fn resolve_module<'a>(&'a self, request: &'a ResolutionRequest) -> BoxFuture<'a, ()> {
        async move {
            if let Some(interceptor) = self.interceptor.get() {
                let outcome = interceptor.resolve_module(request).await;
                log_outcome("resolve_module", &request.request, &outcome);
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{
        CompilerOptions, MemoryFs, ResolveError, ResolveKind, ResolverCall, DEFAULT_OUTPUT,
    };
    use crate::installer::{find_installed, package_name, InstallError, InstallSpec};
    use futures::future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Installs by writing a stub package into `node_modules`.
    struct FakeInstaller {
        root: PathBuf,
        delay: Option<Duration>,
        installs: Mutex<Vec<InstallSpec>>,
    }

    impl FakeInstaller {
        fn new(root: &Path) -> Arc<Self> {
            Arc::new(Self {
                root: root.to_path_buf(),
                delay: None,
                installs: Mutex::new(Vec::new()),
            })
        }

        /// Writes the package only once the returned future has slept.
        fn slow(root: &Path) -> Arc<Self> {
            Arc::new(Self {
                root: root.to_path_buf(),
                delay: Some(Duration::from_millis(100)),
                installs: Mutex::new(Vec::new()),
            })
        }

        fn installs(&self) -> Vec<InstallSpec> {
            self.installs.lock().unwrap().clone()
        }
    }

    impl Installer for FakeInstaller {
        fn check(&self, request: &str) -> Option<String> {
            let name = package_name(request)?;
            find_installed(&self.root, name)
                .is_none()
                .then(|| name.to_string())
        }

        fn install(&self, spec: InstallSpec) -> BoxFuture<'static, Result<(), InstallError>> {
            let pkg = self.root.join("node_modules").join(&spec.package);
            self.installs.lock().unwrap().push(spec);
            let stub = move || {
                write(&pkg.join("package.json"), r#"{"main": "index.js"}"#);
                write(&pkg.join("index.js"), "module.exports = {};");
            };
            match self.delay {
                None => {
                    stub();
                    future::ready(Ok(())).boxed()
                }
                Some(delay) => async move {
                    tokio::time::sleep(delay).await;
                    stub();
                    Ok(())
                }
                .boxed(),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_package_installed_by_precompile() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("src/index.js"),
            "import React from 'react-lite';\nimport './app';",
        );
        write(&root.join("src/app.js"), "export default 1;");

        let installer = FakeInstaller::new(root);
        let plugin =
            AutoInstallPlugin::with_installer(installer.clone(), AutoInstallOptions::default())
                .with_dev_policy(DevPolicy::decide(|request, path| {
                    request == "react-lite" && path.ends_with("src")
                }));
        let mut compiler =
            Compiler::new(CompilerOptions::new(root, "src/index.js")).plugin(Box::new(plugin));

        compiler.watch_run().await.unwrap();
        assert!(!root.join(DEFAULT_OUTPUT).exists());

        let installs = installer.installs();
        assert_eq!(installs.len(), 1);
        assert_eq!(installs[0].package, "react-lite");
        assert!(installs[0].options.dev);

        let stats = compiler.run().await.unwrap();
        assert!(!stats.has_errors(), "{:?}", stats.errors);
        assert_eq!(installer.installs().len(), 1);
        assert!(root.join(DEFAULT_OUTPUT).exists());
    }

    #[tokio::test]
    async fn test_primary_build_dispatches_without_precompile() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("index.js"),
            "const b = require('bootswatch/lumen/bootstrap.css');",
        );

        let installer = FakeInstaller::new(root);
        let plugin =
            AutoInstallPlugin::with_installer(installer.clone(), AutoInstallOptions::default());
        let mut compiler =
            Compiler::new(CompilerOptions::new(root, "index.js")).plugin(Box::new(plugin));

        let _ = compiler.run().await.unwrap();
        let installs = installer.installs();
        assert_eq!(installs.len(), 1);
        assert_eq!(installs[0].package, "bootswatch");
        assert!(!installs[0].options.dev);
    }

    #[tokio::test]
    async fn test_babel_dependencies_installed_on_apply() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("index.js"), "export {};");

        let installer = FakeInstaller::new(root);
        let mut plugin =
            AutoInstallPlugin::with_installer(installer.clone(), AutoInstallOptions::default());
        plugin.babel = vec!["babel-core".into(), "babel-preset-env".into()];
        let mut compiler = Compiler::new(CompilerOptions::new(root, "index.js"))
            .with_output_fs(Arc::new(MemoryFs::new()))
            .plugin(Box::new(plugin));

        compiler.run().await.unwrap();
        let names: Vec<_> = installer.installs().into_iter().map(|s| s.package).collect();
        assert_eq!(names, vec!["babel-core", "babel-preset-env"]);
    }

    struct CountingResolvers(AtomicUsize);

    impl BundlerResolvers for CountingResolvers {
        fn resolve(
            &self,
            _kind: ResolveKind,
            call: ResolverCall<'_>,
        ) -> BoxFuture<'static, Result<PathBuf, ResolveError>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            future::ready(Ok(call.path().join(call.request()))).boxed()
        }
    }

    #[tokio::test]
    async fn test_primary_build_clean_after_slow_precompile_install() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("index.js"), "import pad from 'left-pad';");

        let installer = FakeInstaller::slow(root);
        let plugin =
            AutoInstallPlugin::with_installer(installer.clone(), AutoInstallOptions::default());
        let mut compiler =
            Compiler::new(CompilerOptions::new(root, "index.js")).plugin(Box::new(plugin));

        compiler.watch_run().await.unwrap();
        let stats = compiler.run().await.unwrap();
        assert!(!stats.has_errors(), "{:?}", stats.errors);
        assert_eq!(installer.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_precompile_uses_its_own_resolvers() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("index.js"), "import pad from 'left-pad';");

        let installer = FakeInstaller::new(root);
        let resolvers = Arc::new(CountingResolvers(AtomicUsize::new(0)));
        let plugin =
            AutoInstallPlugin::with_installer(installer.clone(), AutoInstallOptions::default());
        let mut compiler = Compiler::new(CompilerOptions::new(root, "index.js"))
            .with_output_fs(Arc::new(MemoryFs::new()))
            .with_resolvers(resolvers.clone())
            .plugin(Box::new(plugin));

        compiler.watch_run().await.unwrap();
        assert_eq!(resolvers.0.load(Ordering::SeqCst), 0);
        let names: Vec<_> = installer.installs().into_iter().map(|s| s.package).collect();
        assert_eq!(names, vec!["left-pad"]);

        compiler.run().await.unwrap();
        assert!(resolvers.0.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_unsupported_bundler_fails_on_apply() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("index.js"), "import 'lodash';");

        let installer = FakeInstaller::new(dir.path());
        let resolvers = Arc::new(CountingResolvers(AtomicUsize::new(0)));
        let plugin =
            AutoInstallPlugin::with_installer(installer.clone(), AutoInstallOptions::default());
        let mut compiler = Compiler::new(
            CompilerOptions::new(dir.path(), "index.js").with_bundler_version("4.0.0"),
        )
        .with_resolvers(resolvers.clone())
        .plugin(Box::new(plugin));

        let err = compiler.watch_run().await.unwrap_err();
        assert!(err.to_string().contains("Unsupported bundler version: 4.0.0"));
        assert_eq!(resolvers.0.load(Ordering::SeqCst), 0);
        assert!(installer.installs().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_contract_selected_for_v1() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("index.js"), "");

        let installer = FakeInstaller::new(dir.path());
        let plugin = AutoInstallPlugin::with_installer(installer, AutoInstallOptions::default());
        let compiler = Compiler::new(
            CompilerOptions::new(dir.path(), "index.js").with_bundler_version("1.15.0"),
        );
        plugin.apply(&compiler).unwrap();
        assert_eq!(plugin.contract(), Some(ResolverContract::Legacy));
    }
}
