//! The `plugin` command pipeline
//!
//! locate -> negotiate -> sandbox policy -> tools -> invoke. Every step
//! before invocation fails fast, so nothing is launched on error.

use crate::error::Result;
use crate::logging::AuditLogger;
use crate::plugins::{
    find_command_plugin, list_command_plugins, BuildSystem, GrantedOptions, HostPlatform,
    InvocationCoordinator, InvocationDescriptor, PackageGraph, PermissionNegotiator,
    PluginListing, RunnerOutput, SandboxPolicyBuilder, Toolchain, ToolResolver, Workspace,
};
use crate::prompt::Prompter;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Collaborators for one `plugin` command
pub struct PluginCommand<'a> {
    graph: &'a dyn PackageGraph,
    workspace: Workspace,
    build_system: &'a dyn BuildSystem,
    toolchain: &'a dyn Toolchain,
    coordinator: InvocationCoordinator,
    working_directory: PathBuf,
    platform: HostPlatform,
}

impl<'a> PluginCommand<'a> {
    pub fn new(
        graph: &'a dyn PackageGraph,
        workspace: Workspace,
        build_system: &'a dyn BuildSystem,
        toolchain: &'a dyn Toolchain,
        coordinator: InvocationCoordinator,
        working_directory: PathBuf,
    ) -> Self {
        Self {
            graph,
            workspace,
            build_system,
            toolchain,
            coordinator,
            working_directory,
            platform: HostPlatform::current(),
        }
    }

    /// Command plugins available in the package graph
    pub fn list(&self) -> Vec<PluginListing> {
        list_command_plugins(self.graph)
    }

    /// Everything up to, but not including, the launch
    pub fn prepare(
        &self,
        verb: Option<&str>,
        arguments: Vec<String>,
        options: &GrantedOptions,
        prompter: &mut dyn Prompter,
        audit: &mut AuditLogger,
    ) -> Result<InvocationDescriptor> {
        let plugin = find_command_plugin(verb.unwrap_or_default(), self.graph.plugins())?;
        debug!("Selected plugin '{}'", plugin.name);

        let package_root = self.workspace.package_root();
        let negotiated = PermissionNegotiator::new(options, prompter)
            .with_audit(audit)
            .negotiate(plugin, package_root)?;

        let output_directory = self.workspace.plugin_output_directory(plugin);
        let policy = SandboxPolicyBuilder::new(&output_directory, package_root)
            .allow_package_writes(options.allow_writing_to_package_directory)
            .user_directories(&options.additional_writable_directories)
            .negotiated(&negotiated)
            .build();

        let resolution = ToolResolver::new(
            self.graph,
            self.build_system,
            self.toolchain,
            self.platform.clone(),
        )
        .resolve(&plugin.tools)?;

        Ok(InvocationDescriptor::assemble(
            plugin,
            arguments,
            self.working_directory.clone(),
            output_directory,
            resolution,
            policy,
        ))
    }

    /// Prepare and launch the plugin, returning the runner's outcome
    pub async fn run(
        &self,
        verb: Option<&str>,
        arguments: Vec<String>,
        options: &GrantedOptions,
        prompter: &mut dyn Prompter,
        audit: &mut AuditLogger,
    ) -> Result<RunnerOutput> {
        // Prompts and tool builds block this worker until they finish
        let descriptor = tokio::task::block_in_place(|| {
            self.prepare(verb, arguments, options, prompter, audit)
        })?;
        fs::create_dir_all(&descriptor.output_directory)?;

        info!(
            "Running plugin '{}' with verb '{}'",
            descriptor.plugin, descriptor.verb
        );
        audit.maybe_rotate();
        audit.log_invocation_started(&descriptor);

        let started = Instant::now();
        let result = self.coordinator.run(descriptor.clone()).await;
        audit.log_invocation_finished(&descriptor, &result, started.elapsed().as_millis() as u64);

        Ok(result?)
    }
}
