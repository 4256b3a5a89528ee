//! Plugin protocol definitions
//!
//! Plugin descriptors, permission requests, sandbox policies and the
//! invocation descriptor handed to the script runner as a JSON line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A plugin as described by the package graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    /// Plugin name, unique within its package
    pub name: String,
    /// What kind of plugin this is
    pub capability: PluginCapability,
    /// Tool names the plugin's manifest references
    #[serde(default)]
    pub tools: Vec<String>,
    /// Entry point handed to the script runner
    pub executable: PathBuf,
}

/// Behavioral category of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCapability {
    /// User-invoked command, selected by its verb
    Command {
        verb: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        permissions: Vec<PermissionRequest>,
    },
    /// Build-time tool; never invocable from the command line
    BuildTool,
}

impl Plugin {
    /// The verb this plugin answers to, if it is a command plugin
    pub fn command_verb(&self) -> Option<&str> {
        match &self.capability {
            PluginCapability::Command { verb, .. } => Some(verb),
            PluginCapability::BuildTool => None,
        }
    }

    /// Declared permission requests, in declaration order
    pub fn permission_requests(&self) -> &[PermissionRequest] {
        match &self.capability {
            PluginCapability::Command { permissions, .. } => permissions,
            PluginCapability::BuildTool => &[],
        }
    }
}

/// A capability a command plugin asks for before it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionRequest {
    WriteToPackageDirectory {
        reason: String,
    },
    AllowNetworkConnections {
        scope: NetworkScope,
        reason: String,
    },
}

/// Network access a plugin may request or be granted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkScope {
    None,
    Local {
        #[serde(default)]
        ports: Vec<u16>,
    },
    All {
        #[serde(default)]
        ports: Vec<u16>,
    },
    Docker,
    UnixSocket,
}

impl NetworkScope {
    /// Human-readable label used in prompts
    pub fn label(&self) -> &'static str {
        match self {
            NetworkScope::None => "none",
            NetworkScope::Local { .. } => "local",
            NetworkScope::All { .. } => "all",
            NetworkScope::Docker => "docker unix domain socket",
            NetworkScope::UnixSocket => "unix domain socket",
        }
    }

    /// The coarse permission this scope falls under
    pub fn permission(&self) -> NetworkPermission {
        match self {
            NetworkScope::None => NetworkPermission::None,
            NetworkScope::Local { .. } => NetworkPermission::Local,
            NetworkScope::All { .. } => NetworkPermission::All,
            NetworkScope::Docker => NetworkPermission::Docker,
            NetworkScope::UnixSocket => NetworkPermission::UnixDomainSocket,
        }
    }

    /// "on ports: 80, 443" / "on all ports"; `None` for port-less scopes
    pub fn ports_description(&self) -> Option<String> {
        match self {
            NetworkScope::Local { ports } | NetworkScope::All { ports } => {
                if ports.is_empty() {
                    Some("on all ports".to_string())
                } else {
                    let list: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                    Some(format!("on ports: {}", list.join(", ")))
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for NetworkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ports_description() {
            Some(ports) => write!(f, "{} {}", self.label(), ports),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Pre-approved network access as given on the command line (no port list)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPermission {
    #[default]
    None,
    Local,
    All,
    Docker,
    UnixDomainSocket,
}

impl NetworkPermission {
    /// Full scope granted by this permission; port-less means every port.
    /// `none` grants nothing.
    pub fn scope(self) -> Option<NetworkScope> {
        match self {
            NetworkPermission::None => None,
            NetworkPermission::Local => Some(NetworkScope::Local { ports: vec![] }),
            NetworkPermission::All => Some(NetworkScope::All { ports: vec![] }),
            NetworkPermission::Docker => Some(NetworkScope::Docker),
            NetworkPermission::UnixDomainSocket => Some(NetworkScope::UnixSocket),
        }
    }
}

impl fmt::Display for NetworkPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkPermission::None => "none",
            NetworkPermission::Local => "local",
            NetworkPermission::All => "all",
            NetworkPermission::Docker => "docker",
            NetworkPermission::UnixDomainSocket => "unix-domain-socket",
        };
        f.write_str(name)
    }
}

/// Permissions the user granted up front. Immutable for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantedOptions {
    pub allow_writing_to_package_directory: bool,
    /// Extra writable directories, ordered and de-duplicated
    pub additional_writable_directories: Vec<PathBuf>,
    pub pre_approved_network: NetworkPermission,
}

/// Resolved directories and network scopes a plugin process may use
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// Ordered, first occurrence wins; always starts with the output directory
    pub writable_directories: Vec<PathBuf>,
    pub read_only_directories: Vec<PathBuf>,
    pub allowed_network_connections: Vec<NetworkScope>,
}

/// Tool name -> absolute executable path
pub type ToolMap = BTreeMap<String, PathBuf>;

/// Everything the script runner needs to launch one plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDescriptor {
    /// Invocation ID for correlation
    pub id: String,
    /// Plugin name
    pub plugin: String,
    /// Plugin entry point
    pub executable: PathBuf,
    pub verb: String,
    /// Pass-through arguments, verbatim
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
    pub output_directory: PathBuf,
    /// Fallback search order for tools not in the tool map
    pub tool_search_directories: Vec<PathBuf>,
    pub tools: ToolMap,
    pub policy: SandboxPolicy,
}

/// Success payload reported by the script runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOutput {
    pub exit_code: i32,
}

/// Diagnostic severity reported by a running plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Remark,
}

/// Structured message a plugin may print as a single JSON line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    pub severity: Severity,
    pub message: String,
}
