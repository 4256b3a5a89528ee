//! Command-line argument parsing for pkgplug

use crate::plugins::{GrantedOptions, NetworkPermission};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// pkgplug - run command plugins declared by a package
#[derive(Parser, Debug)]
#[command(name = "pkgplug")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Package root (defaults to the current directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub package_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Invoke a command plugin by its verb
    Plugin(PluginArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct PluginArgs {
    /// List available command plugins
    #[arg(long)]
    pub list: bool,

    /// Let the plugin write to the package directory without asking
    #[arg(long)]
    pub allow_writing_to_package_directory: bool,

    /// Let the plugin write to DIR (repeatable)
    #[arg(long, value_name = "DIR")]
    pub allow_writing_to_directory: Vec<PathBuf>,

    /// Pre-approve network connections of this kind
    #[arg(long, value_enum, value_name = "KIND", default_value_t = NetworkPermission::None)]
    pub allow_network_connections: NetworkPermission,

    /// Fail instead of prompting for permissions
    #[arg(long)]
    pub non_interactive: bool,

    /// Plugin verb followed by arguments passed to the plugin verbatim
    #[arg(
        value_name = "VERB",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub invocation: Vec<String>,
}

impl PluginArgs {
    pub fn verb(&self) -> Option<&str> {
        self.invocation.first().map(String::as_str)
    }

    /// Everything after the verb
    pub fn arguments(&self) -> Vec<String> {
        self.invocation.iter().skip(1).cloned().collect()
    }

    /// Options granted on the command line. Relative directories resolve
    /// against `cwd`; repeats are dropped.
    pub fn granted_options(&self, cwd: &Path) -> GrantedOptions {
        let mut directories: Vec<PathBuf> = Vec::new();
        for dir in &self.allow_writing_to_directory {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                cwd.join(dir)
            };
            if !directories.contains(&dir) {
                directories.push(dir);
            }
        }

        GrantedOptions {
            allow_writing_to_package_directory: self.allow_writing_to_package_directory,
            additional_writable_directories: directories,
            pre_approved_network: self.allow_network_connections,
        }
    }
}
