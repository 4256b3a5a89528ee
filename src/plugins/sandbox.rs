//! Sandbox policy construction
//!
//! Combines the plugin output directory, command-line grants and negotiated
//! grants into the directories and network scopes the plugin process may use.

use super::permissions::NegotiatedPermissions;
use super::protocol::{NetworkScope, SandboxPolicy};
use std::path::{Component, Path, PathBuf};

/// Builder for a [`SandboxPolicy`]. The output directory is always writable.
#[derive(Debug, Clone)]
pub struct SandboxPolicyBuilder {
    output_directory: PathBuf,
    package_root: PathBuf,
    allow_package_writes: bool,
    user_directories: Vec<PathBuf>,
    negotiated_directories: Vec<PathBuf>,
    network: Vec<NetworkScope>,
}

impl SandboxPolicyBuilder {
    pub fn new(output_directory: impl Into<PathBuf>, package_root: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            package_root: package_root.into(),
            allow_package_writes: false,
            user_directories: Vec::new(),
            negotiated_directories: Vec::new(),
            network: Vec::new(),
        }
    }

    /// Package directory writable from the command line
    pub fn allow_package_writes(mut self, allow: bool) -> Self {
        self.allow_package_writes = allow;
        self
    }

    /// Extra directories the user made writable
    pub fn user_directories(mut self, dirs: &[PathBuf]) -> Self {
        self.user_directories.extend_from_slice(dirs);
        self
    }

    /// Grants produced by permission negotiation
    pub fn negotiated(mut self, negotiated: &NegotiatedPermissions) -> Self {
        self.negotiated_directories
            .extend_from_slice(&negotiated.writable_directories);
        for scope in &negotiated.network_connections {
            if !self.network.contains(scope) {
                self.network.push(scope.clone());
            }
        }
        self
    }

    pub fn build(self) -> SandboxPolicy {
        let package_root = normalize(&self.package_root);

        let package = self.allow_package_writes.then(|| self.package_root.clone());
        let candidates = std::iter::once(self.output_directory)
            .chain(package)
            .chain(self.user_directories)
            .chain(self.negotiated_directories);

        let mut writable: Vec<PathBuf> = Vec::new();
        for dir in candidates {
            let dir = normalize(&dir);
            if !writable.contains(&dir) {
                writable.push(dir);
            }
        }

        // A writable ancestor already covers the package directory
        let read_only = if writable.iter().any(|dir| package_root.starts_with(dir)) {
            vec![]
        } else {
            vec![package_root]
        };

        SandboxPolicy {
            writable_directories: writable,
            read_only_directories: read_only,
            allowed_network_connections: self.network,
        }
    }
}

/// Lexically normalize `path`: drop `.` components and fold `..` into its
/// parent. Symlinks are not resolved.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
