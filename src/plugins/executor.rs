//! Plugin invocation
//!
//! The coordinator hands one descriptor to a script runner and waits for the
//! runner's single completion. `ProcessRunner` is the reference runner: it
//! launches the plugin executable and speaks JSON lines over stdin/stdout.

use super::protocol::{
    DiagnosticMessage, InvocationDescriptor, Plugin, RunnerOutput, SandboxPolicy, Severity,
};
use super::tools::ToolResolution;
use crate::error::InvocationError;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Environment variable naming the plugin output directory
pub const OUTPUT_DIR_ENV: &str = "PKGPLUG_PLUGIN_OUTPUT_DIR";

pub type InvocationResult = Result<RunnerOutput, InvocationError>;

impl InvocationDescriptor {
    /// Assemble the descriptor for one run of `plugin`
    pub fn assemble(
        plugin: &Plugin,
        arguments: Vec<String>,
        working_directory: PathBuf,
        output_directory: PathBuf,
        resolution: ToolResolution,
        policy: SandboxPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plugin: plugin.name.clone(),
            executable: plugin.executable.clone(),
            verb: plugin.command_verb().unwrap_or_default().to_string(),
            arguments,
            working_directory,
            output_directory,
            tool_search_directories: resolution.search_directories,
            tools: resolution.tools,
            policy,
        }
    }
}

/// Receives output and diagnostics while a plugin runs. Called from
/// runner threads.
pub trait InvocationDelegate: Send + Sync {
    fn output(&self, plugin: &str, line: &str);
    fn diagnostic(&self, plugin: &str, severity: Severity, message: &str);
}

/// Prints plugin output to stdout; diagnostics go through `tracing`
pub struct ConsoleDelegate;

impl InvocationDelegate for ConsoleDelegate {
    fn output(&self, _plugin: &str, line: &str) {
        println!("{}", line);
    }

    fn diagnostic(&self, plugin: &str, severity: Severity, message: &str) {
        match severity {
            Severity::Error => error!("[{}] {}", plugin, message),
            Severity::Warning => warn!("[{}] {}", plugin, message),
            Severity::Remark => info!("[{}] {}", plugin, message),
        }
    }
}

/// One-shot completion handle given to a script runner.
///
/// Dropping it without calling [`Completion::complete`] reports
/// [`InvocationError::Abandoned`].
pub struct Completion {
    sender: oneshot::Sender<InvocationResult>,
}

impl Completion {
    pub fn complete(self, result: InvocationResult) {
        if self.sender.send(result).is_err() {
            debug!("Invocation completed after the coordinator stopped waiting");
        }
    }
}

/// Launches plugins. Must call `complete` on the handle exactly once, from
/// any thread.
pub trait ScriptRunner: Send + Sync {
    fn invoke(
        &self,
        descriptor: InvocationDescriptor,
        delegate: Arc<dyn InvocationDelegate>,
        completion: Completion,
    );
}

/// Submits one invocation at a time and awaits its completion
pub struct InvocationCoordinator {
    runner: Arc<dyn ScriptRunner>,
    delegate: Arc<dyn InvocationDelegate>,
    in_flight: AtomicBool,
}

impl InvocationCoordinator {
    pub fn new(runner: Arc<dyn ScriptRunner>, delegate: Arc<dyn InvocationDelegate>) -> Self {
        Self {
            runner,
            delegate,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run `descriptor` and return the runner's result unchanged
    pub async fn run(&self, descriptor: InvocationDescriptor) -> InvocationResult {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(InvocationError::AlreadyRunning);
        }
        let _guard = InFlightGuard(&self.in_flight);

        debug!("Submitting invocation {} of '{}'", descriptor.id, descriptor.plugin);
        let (sender, receiver) = oneshot::channel();
        self.runner
            .invoke(descriptor, Arc::clone(&self.delegate), Completion { sender });

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(InvocationError::Abandoned),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs plugin executables as child processes on the tokio runtime.
///
/// No OS-level sandbox is applied; the policy travels in the descriptor.
#[derive(Default)]
pub struct ProcessRunner;

impl ScriptRunner for ProcessRunner {
    fn invoke(
        &self,
        descriptor: InvocationDescriptor,
        delegate: Arc<dyn InvocationDelegate>,
        completion: Completion,
    ) {
        tokio::spawn(async move {
            let result = run_process(&descriptor, delegate.as_ref()).await;
            completion.complete(result);
        });
    }
}

async fn run_process(
    descriptor: &InvocationDescriptor,
    delegate: &dyn InvocationDelegate,
) -> InvocationResult {
    let plugin = descriptor.plugin.clone();
    let payload =
        serde_json::to_string(descriptor).map_err(|e| InvocationError::Runner(e.to_string()))?;

    let mut cmd = Command::new(&descriptor.executable);
    cmd.args(&descriptor.arguments)
        .current_dir(&descriptor.working_directory)
        .env(OUTPUT_DIR_ENV, &descriptor.output_directory)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(path) = plugin_path(&descriptor.tool_search_directories) {
        cmd.env("PATH", path);
    }

    info!("Launching plugin '{}' ({:?})", plugin, descriptor.executable);
    let mut child = cmd.spawn().map_err(|e| InvocationError::Spawn {
        plugin: plugin.clone(),
        reason: e.to_string(),
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Plugins that never read stdin may close it early
        if let Err(e) = stdin.write_all(format!("{}\n", payload).as_bytes()).await {
            debug!("Plugin '{}' did not take the descriptor: {}", plugin, e);
        }
    }

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| InvocationError::Runner(e.to_string()))?
        {
            match serde_json::from_str::<DiagnosticMessage>(&line) {
                Ok(diagnostic) => delegate.diagnostic(&plugin, diagnostic.severity, &diagnostic.message),
                Err(_) => delegate.output(&plugin, &line),
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| InvocationError::Runner(e.to_string()))?;

    match status.code() {
        Some(0) => Ok(RunnerOutput { exit_code: 0 }),
        code => {
            let exit_code = code.unwrap_or(-1);
            warn!("Plugin '{}' exited with code {}", plugin, exit_code);
            Err(InvocationError::Failed { plugin, exit_code })
        }
    }
}

/// Search directories followed by the inherited `PATH`, without repeats
fn plugin_path(search_directories: &[PathBuf]) -> Option<std::ffi::OsString> {
    let inherited = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in search_directories.iter().cloned().chain(inherited) {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    match std::env::join_paths(dirs) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Cannot build plugin PATH: {}", e);
            None
        }
    }
}
