//! Package graph and workspace collaborators
//!
//! The plugin subsystem only reads the graph. `ManifestGraph` is the
//! reference provider, loaded from a `pkgplug.toml` description in the
//! package root.

use super::protocol::Plugin;
use super::tools::HostPlatform;
use crate::error::GraphError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where an executable tool comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    /// Prebuilt binary dependency, usable as-is
    Binary(PathBuf),
    /// Executable product of the current package; must be built first
    Product(String),
}

/// Read-only view of the resolved package graph
pub trait PackageGraph {
    /// Name of the root package
    fn package_name(&self) -> &str;

    /// Absolute path of the root package
    fn package_root(&self) -> &Path;

    /// Every plugin visible from the root package, dependencies included
    fn plugins(&self) -> Vec<&Plugin>;

    /// Name of the package declaring `plugin`, when known
    fn owning_package(&self, plugin: &Plugin) -> Option<String>;

    /// How to obtain the tool called `name` on `platform`
    fn tool_source(&self, name: &str, platform: &HostPlatform) -> Option<ToolSource>;
}

/// Plugin working-directory layout under the package's scratch directory
#[derive(Debug, Clone)]
pub struct Workspace {
    package_root: PathBuf,
    scratch_dir: PathBuf,
}

impl Workspace {
    /// Create a workspace; a relative scratch dir is taken from the package root
    pub fn new(package_root: &Path, scratch_dir: &Path) -> Self {
        Self {
            package_root: package_root.to_path_buf(),
            scratch_dir: package_root.join(scratch_dir),
        }
    }

    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// Root of all plugin working directories
    pub fn plugins_directory(&self) -> PathBuf {
        self.scratch_dir.join("plugins")
    }

    /// Output directory handed to `plugin`
    pub fn plugin_output_directory(&self, plugin: &Plugin) -> PathBuf {
        self.plugins_directory().join(&plugin.name).join("outputs")
    }
}

/// On-disk package description
#[derive(Debug, Deserialize)]
struct GraphManifest {
    package: PackageSection,
    #[serde(default, rename = "plugin")]
    plugins: Vec<Plugin>,
    #[serde(default)]
    binaries: BTreeMap<String, BinaryArtifact>,
    #[serde(default)]
    products: BTreeMap<String, String>,
    #[serde(default, rename = "dependency")]
    dependencies: Vec<DependencyPackage>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DependencyPackage {
    name: String,
    #[serde(default, rename = "plugin")]
    plugins: Vec<Plugin>,
}

/// Prebuilt binary, either universal or one path per platform triple
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BinaryArtifact {
    Universal { path: PathBuf },
    PerPlatform { variants: BTreeMap<String, PathBuf> },
}

/// Package graph loaded from the package description file
#[derive(Debug)]
pub struct ManifestGraph {
    root: PathBuf,
    manifest: GraphManifest,
}

impl ManifestGraph {
    /// Load `manifest_name` from `root`
    pub fn load(root: &Path, manifest_name: &str) -> Result<Self, GraphError> {
        let path = root.join(manifest_name);
        debug!("Loading package description from {:?}", path);

        let contents = fs::read_to_string(&path)
            .map_err(|e| GraphError::Read(format!("{}: {}", path.display(), e)))?;

        Self::parse(root, &contents)
            .map_err(|e| match e {
                GraphError::Parse(msg) => GraphError::Parse(format!("{}: {}", path.display(), msg)),
                other => other,
            })
    }

    /// Parse a package description; relative paths resolve against `root`
    pub fn parse(root: &Path, contents: &str) -> Result<Self, GraphError> {
        let mut manifest: GraphManifest =
            toml::from_str(contents).map_err(|e| GraphError::Parse(e.to_string()))?;

        if manifest.package.name.trim().is_empty() {
            return Err(GraphError::Invalid("package.name must not be empty".to_string()));
        }

        check_unique_names(&manifest.package.name, &manifest.plugins)?;
        for dependency in &manifest.dependencies {
            check_unique_names(&dependency.name, &dependency.plugins)?;
        }

        let all_plugins = manifest
            .plugins
            .iter_mut()
            .chain(manifest.dependencies.iter_mut().flat_map(|d| d.plugins.iter_mut()));
        for plugin in all_plugins {
            plugin.executable = root.join(&plugin.executable);
        }

        for artifact in manifest.binaries.values_mut() {
            match artifact {
                BinaryArtifact::Universal { path } => *path = root.join(&*path),
                BinaryArtifact::PerPlatform { variants } => {
                    for path in variants.values_mut() {
                        *path = root.join(&*path);
                    }
                }
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }
}

fn check_unique_names(package: &str, plugins: &[Plugin]) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for plugin in plugins {
        if !seen.insert(plugin.name.as_str()) {
            return Err(GraphError::Invalid(format!(
                "package '{}' declares plugin '{}' more than once",
                package, plugin.name
            )));
        }
    }
    Ok(())
}

impl PackageGraph for ManifestGraph {
    fn package_name(&self) -> &str {
        &self.manifest.package.name
    }

    fn package_root(&self) -> &Path {
        &self.root
    }

    fn plugins(&self) -> Vec<&Plugin> {
        self.manifest
            .plugins
            .iter()
            .chain(self.manifest.dependencies.iter().flat_map(|d| d.plugins.iter()))
            .collect()
    }

    fn owning_package(&self, plugin: &Plugin) -> Option<String> {
        if self.manifest.plugins.contains(plugin) {
            return Some(self.manifest.package.name.clone());
        }
        self.manifest
            .dependencies
            .iter()
            .find(|d| d.plugins.contains(plugin))
            .map(|d| d.name.clone())
    }

    fn tool_source(&self, name: &str, platform: &HostPlatform) -> Option<ToolSource> {
        if let Some(artifact) = self.manifest.binaries.get(name) {
            return match artifact {
                BinaryArtifact::Universal { path } => Some(ToolSource::Binary(path.clone())),
                BinaryArtifact::PerPlatform { variants } => {
                    let variant = variants.get(&platform.triple());
                    if variant.is_none() {
                        debug!("Binary '{}' has no variant for {}", name, platform);
                    }
                    variant.cloned().map(ToolSource::Binary)
                }
            };
        }

        self.manifest
            .products
            .get(name)
            .map(|product| ToolSource::Product(product.clone()))
    }
}
