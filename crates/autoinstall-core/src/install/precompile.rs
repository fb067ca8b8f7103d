//! Nested build run before each watch compilation.
//!
//! The nested build exists only for its side effects: its own plugin
//! instance installs whatever it finds missing, so the primary build sees
//! the packages on its first pass. Output goes to a [`MemoryFs`] and is
//! discarded.

use super::coordinator::InstallCoordinator;
use super::plugin::AutoInstallPlugin;
use crate::compiler::{Compiler, CompilerOptions, MemoryFs};
use crate::installer::Installer;
use crate::options::AutoInstallOptions;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

struct Nested {
    compiler: Compiler,
    coordinator: InstallCoordinator,
    output: Arc<MemoryFs>,
}

/// Builds the nested compiler on first use and reruns it on every pass.
pub struct PreCompilePass {
    options: CompilerOptions,
    installer: Arc<dyn Installer>,
    plugin_options: Arc<AutoInstallOptions>,
    nested: Mutex<Option<Nested>>,
}

impl PreCompilePass {
    pub fn new(
        options: CompilerOptions,
        installer: Arc<dyn Installer>,
        plugin_options: Arc<AutoInstallOptions>,
    ) -> Self {
        Self {
            options,
            installer,
            plugin_options,
            nested: Mutex::new(None),
        }
    }

    fn build(&self) -> Nested {
        let plugin = AutoInstallPlugin::with_installer(
            Arc::clone(&self.installer),
            (*self.plugin_options).clone(),
        );
        let coordinator = plugin.coordinator().clone();
        let output = Arc::new(MemoryFs::new());
        let compiler = Compiler::new(self.options.clone())
            .with_output_fs(output.clone())
            .plugin(Box::new(plugin));
        Nested {
            compiler,
            coordinator,
            output,
        }
    }

    /// Run the nested build and wait for the installs it started.
    ///
    /// The nested build's own result is logged and otherwise ignored.
    pub async fn run(&self) {
        let mut guard = self.nested.lock().await;
        let nested = guard.get_or_insert_with(|| self.build());

        match nested.compiler.run().await {
            Ok(stats) => debug!(
                modules = stats.modules.len(),
                errors = stats.errors.len(),
                "Pre-compile finished"
            ),
            Err(e) => debug!("Pre-compile failed: {e}"),
        }
        nested.coordinator.idle().await;
    }

    /// Files the nested build has written to memory.
    pub async fn discarded_outputs(&self) -> usize {
        self.nested
            .lock()
            .await
            .as_ref()
            .map_or(0, |n| n.output.len())
    }
}

impl std::fmt::Debug for PreCompilePass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreCompilePass")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::DEFAULT_OUTPUT;
    use crate::installer::{find_installed, package_name, InstallError, InstallSpec};
    use futures::future::{BoxFuture, FutureExt};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Writes the package only after a delay.
    struct SlowInstaller {
        root: PathBuf,
        installs: AtomicUsize,
    }

    impl Installer for SlowInstaller {
        fn check(&self, request: &str) -> Option<String> {
            let name = package_name(request)?;
            find_installed(&self.root, name)
                .is_none()
                .then(|| name.to_string())
        }

        fn install(&self, spec: InstallSpec) -> BoxFuture<'static, Result<(), InstallError>> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            let pkg = self.root.join("node_modules").join(&spec.package);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                write(&pkg.join("package.json"), r#"{"main": "index.js"}"#);
                write(&pkg.join("index.js"), "module.exports = {};");
                Ok(())
            }
            .boxed()
        }
    }

    fn pass(root: &Path, installer: Arc<SlowInstaller>) -> PreCompilePass {
        PreCompilePass::new(
            CompilerOptions::new(root, "index.js"),
            installer,
            Arc::new(AutoInstallOptions::default()),
        )
    }

    #[tokio::test]
    async fn test_run_waits_for_installs() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("index.js"), "import pad from 'left-pad';");

        let installer = Arc::new(SlowInstaller {
            root: root.to_path_buf(),
            installs: AtomicUsize::new(0),
        });
        let pass = pass(root, installer.clone());

        pass.run().await;
        assert!(find_installed(root, "left-pad").is_some());
        assert_eq!(installer.installs.load(Ordering::SeqCst), 1);

        pass.run().await;
        assert_eq!(installer.installs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_output_stays_in_memory() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("index.js"), "export {};");

        let installer = Arc::new(SlowInstaller {
            root: root.to_path_buf(),
            installs: AtomicUsize::new(0),
        });
        let pass = pass(root, installer);
        assert_eq!(pass.discarded_outputs().await, 0);

        pass.run().await;
        assert_eq!(pass.discarded_outputs().await, 1);
        assert!(!root.join(DEFAULT_OUTPUT).exists());
    }
}
