#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::struct_excessive_bools)]

mod commands;
mod logging;

use autoinstall_core::compiler::DEFAULT_BUNDLER_VERSION;
use autoinstall_core::{Config, OptionsOverride, PackageManager};
use clap::Parser;
use commands::build::BuildAction;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "autoinstall")]
#[command(author, version, about = "Build a project and install missing dependencies on the fly", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory (the project root)
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Build the project, installing missing packages as they are found
    Build {
        /// Entry file, relative to the project root
        #[arg(default_value = "src/index.js")]
        entry: PathBuf,

        /// Manifest output path
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Bundler version whose resolver contract to use (major 1, 2 or 3)
        #[arg(long, default_value = DEFAULT_BUNDLER_VERSION)]
        bundler_version: String,

        /// Leave a request unbundled (repeatable)
        #[arg(long = "external", value_name = "REQUEST")]
        externals: Vec<String>,

        /// Save installed packages as devDependencies
        #[arg(long)]
        dev: bool,

        /// Do not install peer dependencies of installed packages
        #[arg(long)]
        no_peer_dependencies: bool,

        /// Ask the package manager to be quiet
        #[arg(long)]
        quiet: bool,

        /// Package manager to use (npm, yarn, pnpm); detected from lockfiles by default
        #[arg(long, value_name = "NAME")]
        package_manager: Option<PackageManager>,

        /// Extra argument passed to the package manager (repeatable)
        #[arg(long = "install-arg", value_name = "ARG", allow_hyphen_values = true)]
        install_args: Vec<String>,

        /// Rebuild when files change
        #[arg(short, long)]
        watch: bool,

        /// Debounce delay in milliseconds for watch mode
        #[arg(long, default_value_t = 200)]
        debounce_ms: u64,
    },

    /// Print the package a resolution failure message would install
    Extract {
        /// Failure message, e.g. "Can't resolve 'lodash' in '/proj/src'"
        message: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    // Handles its own output, no logging
    if let Some(Commands::Extract { message }) = &cli.command {
        return commands::extract::run(message, cli.json);
    }

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Extract { .. }) => unreachable!("handled above"),
        Some(Commands::Build {
            entry,
            output,
            bundler_version,
            externals,
            dev,
            no_peer_dependencies,
            quiet,
            package_manager,
            install_args,
            watch,
            debounce_ms,
        }) => {
            let span = tracing::info_span!("build", cmd = "build", cwd = %cwd.display());
            let _guard = span.enter();
            let overrides = OptionsOverride {
                dev: dev.then_some(true),
                peer_dependencies: no_peer_dependencies.then_some(false),
                quiet: quiet.then_some(true),
                package_manager,
                extra_args: install_args,
            };
            let action = BuildAction {
                entry,
                output,
                bundler_version,
                externals,
                overrides,
                watch,
                debounce_ms,
            };
            commands::build::run(&config, action, cli.json)
        }
    }
}
