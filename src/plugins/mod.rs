//! Command plugin system for pkgplug
//!
//! Locates the plugin for a verb, negotiates its permissions, derives its
//! sandbox policy, resolves its tools and hands the result to a script
//! runner. Plugins receive their invocation descriptor as JSON on stdin.

pub mod build;
pub mod executor;
pub mod graph;
pub mod locator;
pub mod permissions;
pub mod protocol;
pub mod sandbox;
pub mod tools;

#[cfg(test)]
pub mod testing;

pub use build::{BuildSystem, CommandBuildSystem, ConfiguredToolchain, Toolchain};
pub use executor::{ConsoleDelegate, InvocationCoordinator, ProcessRunner};
pub use graph::{ManifestGraph, PackageGraph, Workspace};
pub use locator::{find_command_plugin, list_command_plugins, PluginListing};
pub use permissions::PermissionNegotiator;
pub use protocol::{GrantedOptions, InvocationDescriptor, NetworkPermission, RunnerOutput};
pub use sandbox::SandboxPolicyBuilder;
pub use tools::{HostPlatform, ToolResolver};
