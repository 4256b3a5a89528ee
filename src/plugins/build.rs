//! Build system and toolchain collaborators
//!
//! `CommandBuildSystem` shells out to the configured build command and
//! reports the executables it finds in the build output directory.

use crate::config::{BuildConfig, ToolchainConfig};
use crate::error::BuildError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Builds product subsets of the current package
pub trait BuildSystem {
    /// Build `products` and return the executables the build produced.
    /// Blocks until the build finishes.
    fn build(&self, products: &[String]) -> Result<Vec<PathBuf>, BuildError>;
}

/// Locates the compiler of the active toolchain
pub trait Toolchain {
    fn compiler_path(&self) -> Option<PathBuf>;
}

/// Build system driven by an external command
pub struct CommandBuildSystem {
    config: BuildConfig,
    package_root: PathBuf,
}

impl CommandBuildSystem {
    pub fn new(config: BuildConfig, package_root: &Path) -> Self {
        Self {
            config,
            package_root: package_root.to_path_buf(),
        }
    }

    /// Directory scanned for executables after a build
    pub fn output_directory(&self) -> PathBuf {
        self.package_root.join(&self.config.output_dir)
    }

    fn command(&self, products: &[String]) -> Result<Command, BuildError> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| BuildError::Spawn("build command is empty".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        for product in products {
            cmd.arg(&self.config.product_flag).arg(product);
        }
        cmd.current_dir(&self.package_root);
        Ok(cmd)
    }
}

impl BuildSystem for CommandBuildSystem {
    fn build(&self, products: &[String]) -> Result<Vec<PathBuf>, BuildError> {
        info!("Building {}", products.join(", "));

        // Build chatter goes to stderr so plugin output stays clean
        let status = self
            .command(products)?
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()))
            .status()
            .map_err(|e| BuildError::Spawn(e.to_string()))?;

        if !status.success() {
            return Err(BuildError::Failed(status.code().unwrap_or(-1)));
        }

        scan_executables(&self.output_directory())
    }
}

/// List executable files directly inside `dir`
fn scan_executables(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let entries =
        fs::read_dir(dir).map_err(|e| BuildError::Scan(format!("{}: {}", dir.display(), e)))?;

    let mut executables: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_executable(path))
        .collect();
    executables.sort();

    debug!("Found {} executables in {:?}", executables.len(), dir);
    Ok(executables)
}

/// Toolchain resolved from configuration, falling back to `PATH`
pub struct ConfiguredToolchain {
    config: ToolchainConfig,
}

impl ConfiguredToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }
}

impl Toolchain for ConfiguredToolchain {
    fn compiler_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.compiler_path {
            return Some(path.clone());
        }

        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.config.compiler))
            .find(|candidate| is_executable(candidate))
    }
}

/// Check if a file is executable
#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        meta.is_file() && meta.permissions().mode() & 0o111 != 0
    } else {
        false
    }
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}
