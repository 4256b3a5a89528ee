//! Configuration management for pkgplug
//!
//! Handles loading and merging configuration from multiple sources:
//! 1. Compiled defaults
//! 2. User config (~/.pkgplug/config.toml)
//! 3. CLI-specified config (--config)
//! 4. Package config (<package>/.pkgplugrc)
//! 5. Environment variables

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub build: BuildConfig,
    pub toolchain: ToolchainConfig,
    pub audit: AuditConfig,
}

/// Package layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Scratch directory, relative to the package root
    pub scratch_dir: PathBuf,
    /// Package description file name
    pub manifest: String,
}

/// Build command used to produce tool executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Program and leading arguments
    pub command: Vec<String>,
    /// Flag placed before each product name
    pub product_flag: String,
    /// Where built executables land, relative to the package root
    pub output_dir: PathBuf,
}

/// Toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler looked up on PATH when no explicit path is set
    pub compiler: String,
    pub compiler_path: Option<PathBuf>,
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Log file path
    pub log_path: PathBuf,
    /// Redact secrets from logged arguments
    pub redact_secrets: bool,
    /// Maximum log file size before rotation
    pub max_log_size: u64,
    /// Number of rotated logs to keep
    pub log_retention: u32,
}

/// Switches as written in one config file; `None` when the file leaves them out
#[derive(Debug, Default, Deserialize)]
struct FileSwitches {
    #[serde(default)]
    audit: AuditSwitches,
}

#[derive(Debug, Default, Deserialize)]
struct AuditSwitches {
    enabled: Option<bool>,
    redact_secrets: Option<bool>,
}

// Default implementations

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from(".build"),
            manifest: "pkgplug.toml".to_string(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "build".to_string()],
            product_flag: "--bin".to_string(),
            output_dir: PathBuf::from("target/debug"),
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: "rustc".to_string(),
            compiler_path: None,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            enabled: true,
            log_path: home.join(".pkgplug/logs/plugins.log"),
            redact_secrets: true,
            max_log_size: 10 * 1024 * 1024, // 10MB
            log_retention: 5,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(cli_config: Option<&Path>, package_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Load user config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".pkgplug/config.toml");
            if user_config.exists() {
                debug!("Loading user config from {:?}", user_config);
                config.merge_from_file(&user_config)?;
            }
        }

        // Load CLI-specified config
        if let Some(path) = cli_config {
            debug!("Loading CLI config from {:?}", path);
            config.merge_from_file(path)?;
        }

        config.load_package_config(package_dir)?;

        // Apply environment overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load and merge package config (.pkgplugrc)
    fn load_package_config(&mut self, dir: &Path) -> Result<(), ConfigError> {
        let package_config = dir.join(".pkgplugrc");
        if package_config.exists() {
            debug!("Loading package config from {:?}", package_config);
            self.merge_from_file(&package_config)?;
        }
        Ok(())
    }

    /// Merge configuration from a file
    fn merge_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

        let file_config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        let switches: FileSwitches = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        self.merge(file_config);
        self.apply_switches(switches.audit);
        Ok(())
    }

    /// Boolean switches only change when a layer sets them
    fn apply_switches(&mut self, switches: AuditSwitches) {
        if let Some(enabled) = switches.enabled {
            self.audit.enabled = enabled;
        }
        if let Some(redact) = switches.redact_secrets {
            self.audit.redact_secrets = redact;
        }
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        // Workspace config
        let workspace = WorkspaceConfig::default();
        if other.workspace.scratch_dir != workspace.scratch_dir {
            self.workspace.scratch_dir = other.workspace.scratch_dir;
        }
        if other.workspace.manifest != workspace.manifest {
            self.workspace.manifest = other.workspace.manifest;
        }

        // Build config
        let build = BuildConfig::default();
        if other.build.command != build.command {
            self.build.command = other.build.command;
        }
        if other.build.product_flag != build.product_flag {
            self.build.product_flag = other.build.product_flag;
        }
        if other.build.output_dir != build.output_dir {
            self.build.output_dir = other.build.output_dir;
        }

        // Toolchain config
        if other.toolchain.compiler != ToolchainConfig::default().compiler {
            self.toolchain.compiler = other.toolchain.compiler;
        }
        if other.toolchain.compiler_path.is_some() {
            self.toolchain.compiler_path = other.toolchain.compiler_path;
        }

        // Audit config; `enabled` and `redact_secrets` go through `apply_switches`
        let audit = AuditConfig::default();
        if other.audit.log_path != audit.log_path {
            self.audit.log_path = other.audit.log_path;
        }
        if other.audit.max_log_size != audit.max_log_size {
            self.audit.max_log_size = other.audit.max_log_size;
        }
        if other.audit.log_retention != audit.log_retention {
            self.audit.log_retention = other.audit.log_retention;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(scratch) = std::env::var("PKGPLUG_SCRATCH_DIR") {
            self.workspace.scratch_dir = PathBuf::from(scratch);
        }
        if let Ok(compiler) = std::env::var("PKGPLUG_COMPILER") {
            self.toolchain.compiler_path = Some(PathBuf::from(compiler));
        }
        if let Ok(log) = std::env::var("PKGPLUG_AUDIT_LOG") {
            self.audit.log_path = PathBuf::from(log);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace.manifest.trim().is_empty() {
            return Err(ConfigError::MissingField("workspace.manifest".to_string()));
        }
        if self.build.command.is_empty() {
            return Err(ConfigError::MissingField("build.command".to_string()));
        }
        if self.build.product_flag.is_empty() {
            return Err(ConfigError::MissingField("build.product_flag".to_string()));
        }
        if self.workspace.scratch_dir.is_absolute() {
            return Err(ConfigError::Invalid(
                "workspace.scratch_dir must be relative to the package root".to_string(),
            ));
        }
        if self.audit.log_retention == 0 {
            return Err(ConfigError::Invalid(
                "audit.log_retention must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
