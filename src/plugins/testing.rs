//! In-memory collaborators for unit tests

use super::build::{BuildSystem, Toolchain};
use super::graph::{PackageGraph, ToolSource};
use super::protocol::{PermissionRequest, Plugin, PluginCapability};
use super::tools::HostPlatform;
use crate::error::BuildError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Build a command plugin with the given permission requests
pub fn command_plugin(name: &str, verb: &str, permissions: Vec<PermissionRequest>) -> Plugin {
    Plugin {
        name: name.to_string(),
        capability: PluginCapability::Command {
            verb: verb.to_string(),
            description: String::new(),
            permissions,
        },
        tools: vec![],
        executable: PathBuf::from(format!("/plugins/{}", name.to_lowercase())),
    }
}

/// Build a build-tool plugin
pub fn build_tool_plugin(name: &str) -> Plugin {
    Plugin {
        name: name.to_string(),
        capability: PluginCapability::BuildTool,
        tools: vec![],
        executable: PathBuf::from(format!("/plugins/{}", name.to_lowercase())),
    }
}

pub struct FakeGraph {
    pub name: String,
    pub root: PathBuf,
    pub plugins: Vec<Plugin>,
    /// plugin name -> owning package
    pub owners: HashMap<String, String>,
    pub binaries: HashMap<String, PathBuf>,
    pub products: HashMap<String, String>,
}

impl FakeGraph {
    pub fn new(name: &str, root: &str) -> Self {
        Self {
            name: name.to_string(),
            root: PathBuf::from(root),
            plugins: vec![],
            owners: HashMap::new(),
            binaries: HashMap::new(),
            products: HashMap::new(),
        }
    }

    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }
}

impl PackageGraph for FakeGraph {
    fn package_name(&self) -> &str {
        &self.name
    }

    fn package_root(&self) -> &Path {
        &self.root
    }

    fn plugins(&self) -> Vec<&Plugin> {
        self.plugins.iter().collect()
    }

    fn owning_package(&self, plugin: &Plugin) -> Option<String> {
        self.owners.get(&plugin.name).cloned()
    }

    fn tool_source(&self, name: &str, _platform: &HostPlatform) -> Option<ToolSource> {
        if let Some(path) = self.binaries.get(name) {
            return Some(ToolSource::Binary(path.clone()));
        }
        self.products.get(name).cloned().map(ToolSource::Product)
    }
}

/// Records every build call and reports canned outputs
#[derive(Default)]
pub struct FakeBuildSystem {
    outputs: Vec<PathBuf>,
    failure: Option<String>,
    builds: RefCell<Vec<Vec<String>>>,
}

impl FakeBuildSystem {
    pub fn with_outputs(outputs: &[&str]) -> Self {
        Self {
            outputs: outputs.iter().map(PathBuf::from).collect(),
            ..Self::default()
        }
    }

    pub fn failing(error: BuildError) -> Self {
        Self {
            failure: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn builds(&self) -> Vec<Vec<String>> {
        self.builds.borrow().clone()
    }

    pub fn build_count(&self) -> usize {
        self.builds.borrow().len()
    }
}

impl BuildSystem for FakeBuildSystem {
    fn build(&self, products: &[String]) -> Result<Vec<PathBuf>, BuildError> {
        self.builds.borrow_mut().push(products.to_vec());
        match &self.failure {
            Some(message) => Err(BuildError::Spawn(message.clone())),
            None => Ok(self.outputs.clone()),
        }
    }
}

pub struct FixedToolchain(pub Option<PathBuf>);

impl Toolchain for FixedToolchain {
    fn compiler_path(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}
