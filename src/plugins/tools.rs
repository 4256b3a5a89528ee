//! Tool resolution
//!
//! Maps every tool name a plugin references to an executable path,
//! building products of the current package when needed.

use super::build::{BuildSystem, Toolchain};
use super::graph::{PackageGraph, ToolSource};
use super::protocol::ToolMap;
use crate::error::ToolResolutionError;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Platform the binary runs on, used to pick binary artifact variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    arch: String,
    os: String,
}

impl HostPlatform {
    pub fn new(arch: &str, os: &str) -> Self {
        Self {
            arch: arch.to_string(),
            os: os.to_string(),
        }
    }

    /// Platform of the running binary
    pub fn current() -> Self {
        Self::new(std::env::consts::ARCH, std::env::consts::OS)
    }

    /// `<arch>-<os>`, e.g. `x86_64-linux`
    pub fn triple(&self) -> String {
        format!("{}-{}", self.arch, self.os)
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.triple())
    }
}

/// Resolved tools plus the fallback search order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResolution {
    pub tools: ToolMap,
    pub search_directories: Vec<PathBuf>,
}

/// Resolves plugin tool names against the package graph
pub struct ToolResolver<'a> {
    graph: &'a dyn PackageGraph,
    build_system: &'a dyn BuildSystem,
    toolchain: &'a dyn Toolchain,
    platform: HostPlatform,
    inherited_path: Option<OsString>,
}

impl<'a> ToolResolver<'a> {
    pub fn new(
        graph: &'a dyn PackageGraph,
        build_system: &'a dyn BuildSystem,
        toolchain: &'a dyn Toolchain,
        platform: HostPlatform,
    ) -> Self {
        Self {
            graph,
            build_system,
            toolchain,
            platform,
            inherited_path: std::env::var_os("PATH"),
        }
    }

    /// Use `path` instead of the process `PATH` for the fallback search order
    #[cfg(test)]
    pub fn with_inherited_path(mut self, path: Option<OsString>) -> Self {
        self.inherited_path = path;
        self
    }

    /// Resolve `tool_names` in order. The first failure aborts resolution.
    pub fn resolve(&self, tool_names: &[String]) -> Result<ToolResolution, ToolResolutionError> {
        let mut tools = ToolMap::new();
        for name in tool_names {
            let path = self.resolve_tool(name)?;
            debug!("Tool '{}' resolved to {:?}", name, path);
            tools.insert(name.clone(), path);
        }

        Ok(ToolResolution {
            tools,
            search_directories: self.search_directories(),
        })
    }

    fn resolve_tool(&self, name: &str) -> Result<PathBuf, ToolResolutionError> {
        match self.graph.tool_source(name, &self.platform) {
            Some(ToolSource::Binary(path)) => Ok(path),
            Some(ToolSource::Product(product)) => {
                info!("Building product '{}' for tool '{}'", product, name);
                let outputs = self
                    .build_system
                    .build(std::slice::from_ref(&product))
                    .map_err(|source| ToolResolutionError::BuildFailed {
                        tool: name.to_string(),
                        source,
                    })?;

                find_product(&outputs, &product).ok_or_else(|| {
                    ToolResolutionError::MissingOutput {
                        tool: name.to_string(),
                        product,
                    }
                })
            }
            None => Err(ToolResolutionError::Unknown {
                tool: name.to_string(),
            }),
        }
    }

    /// Compiler directory first, then the inherited `PATH`, without repeats
    pub fn search_directories(&self) -> Vec<PathBuf> {
        let compiler_dir = self
            .toolchain
            .compiler_path()
            .and_then(|compiler| compiler.parent().map(Path::to_path_buf));
        let inherited = self
            .inherited_path
            .as_ref()
            .map(|path| std::env::split_paths(path).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut directories: Vec<PathBuf> = Vec::new();
        for dir in compiler_dir.into_iter().chain(inherited) {
            if !dir.as_os_str().is_empty() && !directories.contains(&dir) {
                directories.push(dir);
            }
        }
        directories
    }
}

/// Binary among `outputs` named `product`, or `product` plus the host executable suffix
fn find_product(outputs: &[PathBuf], product: &str) -> Option<PathBuf> {
    let named = |name: &str| {
        outputs
            .iter()
            .find(|path| path.file_name().is_some_and(|file| file == name))
    };

    named(product)
        .or_else(|| {
            if std::env::consts::EXE_SUFFIX.is_empty() {
                None
            } else {
                named(&format!("{}{}", product, std::env::consts::EXE_SUFFIX))
            }
        })
        .cloned()
}
