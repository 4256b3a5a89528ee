//! Error types for pkgplug

use thiserror::Error;

/// Main error type for pkgplug
#[derive(Error, Debug)]
pub enum PkgplugError {
    #[error("Invalid plugin command: {0}")]
    Validation(#[from] ValidationError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Tool resolution failed: {0}")]
    ToolResolution(#[from] ToolResolutionError),

    #[error("Plugin invocation failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Package graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems with the requested verb, reported before anything runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing plugin command verb; pass a verb or use --list")]
    MissingVerb,

    #[error("No command plugin found for verb '{0}'")]
    NotFound(String),

    #[error("{count} plugins found for verb '{verb}'; a verb must select exactly one plugin")]
    Ambiguous { verb: String, count: usize },
}

/// Permission negotiation failures. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Plugin '{plugin}' was denied permission to {permission}")]
    Denied { plugin: String, permission: String },

    #[error(
        "Plugin '{plugin}' needs permission to {permission} (stated reason: \"{reason}\"); use `{remedy}` to allow this"
    )]
    Unavailable {
        plugin: String,
        permission: String,
        reason: String,
        remedy: String,
    },

    #[error("Failed to read permission response: {0}")]
    Prompt(String),
}

/// Tool lookup and build failures
#[derive(Error, Debug)]
pub enum ToolResolutionError {
    #[error("Tool '{tool}' is not provided by any binary dependency or product")]
    Unknown { tool: String },

    #[error("Failed to build tool '{tool}': {source}")]
    BuildFailed {
        tool: String,
        #[source]
        source: BuildError,
    },

    #[error("Building product '{product}' did not produce an executable for tool '{tool}'")]
    MissingOutput { tool: String, product: String },
}

/// Failures reported by, or around, the script runner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Failed to launch plugin '{plugin}': {reason}")]
    Spawn { plugin: String, reason: String },

    #[error("Plugin '{plugin}' exited with code {exit_code}")]
    Failed { plugin: String, exit_code: i32 },

    #[error("Script runner dropped the invocation without reporting completion")]
    Abandoned,

    #[error("A plugin invocation is already in flight")]
    AlreadyRunning,

    #[error("Script runner error: {0}")]
    Runner(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors loading the package graph description
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Failed to read package description: {0}")]
    Read(String),

    #[error("Failed to parse package description: {0}")]
    Parse(String),

    #[error("Invalid package description: {0}")]
    Invalid(String),
}

/// Build system errors
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to start build command: {0}")]
    Spawn(String),

    #[error("Build command exited with code {0}")]
    Failed(i32),

    #[error("Failed to scan build outputs: {0}")]
    Scan(String),
}

/// Result type alias using PkgplugError
pub type Result<T> = std::result::Result<T, PkgplugError>;
