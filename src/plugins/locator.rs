//! Plugin locator
//!
//! Selects the command plugin answering to a verb, and lists the
//! command plugins available in the package graph.

use super::graph::PackageGraph;
use super::protocol::Plugin;
use crate::error::ValidationError;
use std::fmt;
use tracing::debug;

/// Find the single command plugin registered for `verb`
pub fn find_command_plugin<'a, I>(verb: &str, plugins: I) -> Result<&'a Plugin, ValidationError>
where
    I: IntoIterator<Item = &'a Plugin>,
{
    if verb.trim().is_empty() {
        return Err(ValidationError::MissingVerb);
    }

    let matches: Vec<&Plugin> = plugins
        .into_iter()
        .filter(|p| p.command_verb() == Some(verb))
        .collect();

    debug!("{} plugin(s) match verb '{}'", matches.len(), verb);

    match matches.as_slice() {
        [] => Err(ValidationError::NotFound(verb.to_string())),
        [plugin] => Ok(*plugin),
        _ => Err(ValidationError::Ambiguous {
            verb: verb.to_string(),
            count: matches.len(),
        }),
    }
}

/// A command plugin as shown by `--list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginListing {
    pub plugin: String,
    pub verb: String,
    /// Owning package, when the graph can tell
    pub package: Option<String>,
}

impl fmt::Display for PluginListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (plugin '{}'", self.verb, self.plugin)?;
        if let Some(package) = &self.package {
            write!(f, " in package '{}'", package)?;
        }
        write!(f, ")")
    }
}

/// All command plugins, sorted by plugin name
pub fn list_command_plugins(graph: &dyn PackageGraph) -> Vec<PluginListing> {
    let mut listings: Vec<PluginListing> = graph
        .plugins()
        .into_iter()
        .filter_map(|plugin| {
            plugin.command_verb().map(|verb| PluginListing {
                plugin: plugin.name.clone(),
                verb: verb.to_string(),
                package: graph.owning_package(plugin),
            })
        })
        .collect();

    listings.sort_by(|a, b| a.plugin.cmp(&b.plugin));
    listings
}
