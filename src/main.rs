//! pkgplug - run command plugins declared by a package
//!
//! This is the main entry point for the pkgplug binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

mod cli;
mod command;
mod config;
mod error;
mod logging;
mod plugins;
mod prompt;

use cli::{Args, Command, PluginArgs};
use command::PluginCommand;
use config::Config;
use logging::AuditLogger;
use plugins::{
    CommandBuildSystem, ConfiguredToolchain, ConsoleDelegate, InvocationCoordinator,
    ManifestGraph, PackageGraph, ProcessRunner, Workspace,
};
use prompt::ConsolePrompter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.debug);

    info!("Starting pkgplug v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let package_root = match &args.package_path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => cwd.join(path),
        None => cwd.clone(),
    };
    debug!("Package root: {:?}", package_root);

    // Load configuration
    let config = Config::load(args.config.as_deref(), &package_root)
        .map_err(error::PkgplugError::from)?;

    match args.command {
        Command::Plugin(plugin_args) => run_plugin(&config, &package_root, &cwd, plugin_args).await,
    }
}

async fn run_plugin(
    config: &Config,
    package_root: &Path,
    cwd: &Path,
    args: PluginArgs,
) -> Result<()> {
    let graph = ManifestGraph::load(package_root, &config.workspace.manifest)
        .map_err(error::PkgplugError::from)?;
    debug!(
        "Loaded package '{}' with {} plugins",
        graph.package_name(),
        graph.plugins().len()
    );
    let workspace = Workspace::new(graph.package_root(), &config.workspace.scratch_dir);
    let build_system = CommandBuildSystem::new(config.build.clone(), graph.package_root());
    let toolchain = ConfiguredToolchain::new(config.toolchain.clone());
    let coordinator =
        InvocationCoordinator::new(Arc::new(ProcessRunner), Arc::new(ConsoleDelegate));

    let command = PluginCommand::new(
        &graph,
        workspace,
        &build_system,
        &toolchain,
        coordinator,
        PathBuf::from(cwd),
    );

    if args.list {
        let listings = command.list();
        if listings.is_empty() {
            println!("No command plugins available");
        }
        for listing in listings {
            println!("{}", listing);
        }
        return Ok(());
    }

    let mut prompter = if args.non_interactive {
        ConsolePrompter::non_interactive()
    } else {
        ConsolePrompter::detect()
    };
    let mut audit = AuditLogger::new(config.audit.clone());
    let options = args.granted_options(cwd);

    let output = command
        .run(
            args.verb(),
            args.arguments(),
            &options,
            &mut prompter,
            &mut audit,
        )
        .await?;

    info!("Plugin finished with exit code {}", output.exit_code);
    Ok(())
}

/// Initialize the logging/tracing subsystem
fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("PKGPLUG_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
