//! `autoinstall build` command implementation.

use autoinstall_core::compiler::{Compiler, CompilerOptions, Stats};
use autoinstall_core::install::is_dependency_context;
use autoinstall_core::{AutoInstallPlugin, Config, InstallCoordinator, OptionsOverride};
use miette::{IntoDiagnostic, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Build command action.
#[derive(Debug, Clone)]
pub struct BuildAction {
    /// Entry file, relative to the project root.
    pub entry: PathBuf,
    /// Manifest output path. `None` uses the compiler default.
    pub output: Option<PathBuf>,
    /// Version whose resolver contract the compiler speaks.
    pub bundler_version: String,
    /// Requests left external.
    pub externals: Vec<String>,
    /// Overrides from the command line. Layered over the config file.
    pub overrides: OptionsOverride,
    /// Rebuild on file changes.
    pub watch: bool,
    /// Debounce delay in milliseconds for watch mode.
    pub debounce_ms: u64,
}

#[derive(Serialize)]
struct BuildResultJson<'a> {
    ok: bool,
    cwd: String,
    #[serde(flatten)]
    stats: &'a Stats,
}

/// Run the build command.
pub fn run(config: &Config, action: BuildAction, json: bool) -> Result<()> {
    let cwd = &config.cwd;
    let overrides = OptionsOverride::load(cwd)
        .into_diagnostic()?
        .unwrap_or_default()
        .layer(action.overrides.clone());

    let plugin = AutoInstallPlugin::new(cwd, overrides).into_diagnostic()?;
    let coordinator = plugin.coordinator().clone();

    let mut options = CompilerOptions::new(cwd, &action.entry)
        .with_bundler_version(action.bundler_version.clone());
    if let Some(output) = &action.output {
        options = options.with_output(output);
    }
    if !action.externals.is_empty() {
        options = options.with_externals(action.externals.clone());
    }
    let mut compiler = Compiler::new(options).plugin(Box::new(plugin));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async {
        if action.watch {
            watch(&mut compiler, &coordinator, cwd, &action, json).await
        } else {
            let stats = build_once(&mut compiler, &coordinator).await?;
            report(cwd, &stats, json)?;
            if stats.has_errors() {
                std::process::exit(1);
            }
            Ok(())
        }
    })
}

/// One pre-compile pass plus the primary build, then wait for stray installs.
async fn build_once(compiler: &mut Compiler, coordinator: &InstallCoordinator) -> Result<Stats> {
    compiler.watch_run().await.into_diagnostic()?;
    let stats = compiler.run().await.into_diagnostic()?;
    coordinator.idle().await;
    Ok(stats)
}

fn report(cwd: &Path, stats: &Stats, json: bool) -> Result<()> {
    if json {
        let result = BuildResultJson {
            ok: !stats.has_errors(),
            cwd: cwd.display().to_string(),
            stats,
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
        return Ok(());
    }

    for err in &stats.errors {
        eprintln!("error: {err}");
    }
    println!(
        "Built {} modules ({} external, {} errors)",
        stats.modules.len(),
        stats.externals.len(),
        stats.errors.len()
    );
    Ok(())
}

/// Whether a file event should trigger a rebuild.
fn should_rebuild(event: &Event, output: &Path) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| !is_dependency_context(p) && !p.starts_with(output))
}

async fn watch(
    compiler: &mut Compiler,
    coordinator: &InstallCoordinator,
    cwd: &Path,
    action: &BuildAction,
    json: bool,
) -> Result<()> {
    let output_dir = compiler
        .options()
        .output
        .parent()
        .map(|p| cwd.join(p))
        .unwrap_or_else(|| cwd.to_path_buf());

    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if should_rebuild(&event, &output_dir) {
                    if let Err(e) = tx.send(()) {
                        warn!(error = %e, "Failed to send watch event");
                    }
                }
            }
            Err(e) => error!(error = %e, "Watch error"),
        },
        notify::Config::default(),
    )
    .into_diagnostic()?;
    watcher
        .watch(cwd, RecursiveMode::Recursive)
        .into_diagnostic()?;
    info!(root = %cwd.display(), "Watching for changes");

    let debounce = Duration::from_millis(action.debounce_ms);
    loop {
        let stats = build_once(compiler, coordinator).await?;
        report(cwd, &stats, json)?;

        tokio::select! {
            changed = rx.recv() => {
                if changed.is_none() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
        }

        tokio::time::sleep(debounce).await;
        let mut coalesced = 0usize;
        while rx.try_recv().is_ok() {
            coalesced += 1;
        }
        debug!(coalesced, "Rebuilding");
    }
}
