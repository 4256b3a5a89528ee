//! Audit log for plugin invocations
//!
//! Records permission decisions and plugin runs as JSON lines so a user
//! can review what a plugin was allowed to do.

use crate::config::AuditConfig;
use crate::error::InvocationError;
use crate::plugins::{InvocationDescriptor, RunnerOutput};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Session ID for the current process
static SESSION_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // key=value style credentials, including --token=... flags
        Regex::new(
            r#"(?i)(api[_-]?key|token|secret|password|passwd|pwd)\s*[=:]\s*['"]?([^'"\s]+)['"]?"#,
        )
        .unwrap(),
        // Bearer tokens
        Regex::new(r"(?i)bearer\s+[a-zA-Z0-9._-]+").unwrap(),
        // AWS keys
        Regex::new(r"AKIA[A-Z0-9]{16}").unwrap(),
        // Private keys
        Regex::new(r"-----BEGIN\s+(?:RSA\s+)?PRIVATE\s+KEY-----").unwrap(),
    ]
});

/// One line of the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub user: String,
    pub plugin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    /// Permission text, failure reason, or granted policy summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Types of audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    PermissionGranted,
    PermissionDenied,
    InvocationStarted,
    InvocationFinished,
    InvocationFailed,
}

/// JSON-lines audit logger
pub struct AuditLogger {
    config: AuditConfig,
    log_file: Option<BufWriter<File>>,
}

impl AuditLogger {
    /// Opens the log file eagerly when enabled
    pub fn new(config: AuditConfig) -> Self {
        let log_file = if config.enabled {
            Self::open_log_file(&config.log_path)
        } else {
            None
        };

        Self { config, log_file }
    }

    /// Logger that records nothing
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(AuditConfig {
            enabled: false,
            ..AuditConfig::default()
        })
    }

    /// Append to `path`, creating parent directories as needed
    fn open_log_file(path: &Path) -> Option<BufWriter<File>> {
        let opened = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(path));

        match opened {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                error!("Cannot open audit log {:?}: {}", path, e);
                None
            }
        }
    }

    fn entry(&self, event: AuditEvent, plugin: &str) -> AuditEntry {
        AuditEntry {
            session_id: SESSION_ID.clone(),
            timestamp: Utc::now(),
            event,
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            plugin: plugin.to_string(),
            invocation_id: None,
            verb: None,
            detail: None,
            arguments: vec![],
            exit_code: None,
            duration_ms: None,
        }
    }

    /// Log a permission the user approved at the prompt
    pub fn log_permission_granted(&mut self, plugin: &str, permission: &str) {
        if !self.config.enabled {
            return;
        }

        let mut entry = self.entry(AuditEvent::PermissionGranted, plugin);
        entry.detail = Some(permission.to_string());
        self.write_entry(&entry);
    }

    /// Log a permission that was refused or could not be requested
    pub fn log_permission_denied(&mut self, plugin: &str, permission: &str, reason: &str) {
        if !self.config.enabled {
            return;
        }

        let mut entry = self.entry(AuditEvent::PermissionDenied, plugin);
        entry.detail = Some(format!("{}: {}", permission, reason));
        self.write_entry(&entry);
    }

    /// Log the descriptor handed to the script runner
    pub fn log_invocation_started(&mut self, descriptor: &InvocationDescriptor) {
        if !self.config.enabled {
            return;
        }

        let policy = &descriptor.policy;
        let network: Vec<String> = policy
            .allowed_network_connections
            .iter()
            .map(|scope| scope.to_string())
            .collect();

        let mut entry = self.entry(AuditEvent::InvocationStarted, &descriptor.plugin);
        entry.invocation_id = Some(descriptor.id.clone());
        entry.verb = Some(descriptor.verb.clone());
        entry.arguments = descriptor
            .arguments
            .iter()
            .map(|arg| self.redact_if_needed(arg))
            .collect();
        entry.detail = Some(format!(
            "writable: {}; network: {}",
            policy
                .writable_directories
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            if network.is_empty() {
                "none".to_string()
            } else {
                network.join(", ")
            }
        ));
        self.write_entry(&entry);
    }

    /// Log the completion reported by the script runner
    pub fn log_invocation_finished(
        &mut self,
        descriptor: &InvocationDescriptor,
        result: &Result<RunnerOutput, InvocationError>,
        duration_ms: u64,
    ) {
        if !self.config.enabled {
            return;
        }

        let event = if result.is_ok() {
            AuditEvent::InvocationFinished
        } else {
            AuditEvent::InvocationFailed
        };

        let mut entry = self.entry(event, &descriptor.plugin);
        entry.invocation_id = Some(descriptor.id.clone());
        entry.verb = Some(descriptor.verb.clone());
        entry.duration_ms = Some(duration_ms);
        match result {
            Ok(output) => entry.exit_code = Some(output.exit_code),
            Err(InvocationError::Failed { exit_code, .. }) => {
                entry.exit_code = Some(*exit_code);
            }
            Err(e) => entry.detail = Some(e.to_string()),
        }
        self.write_entry(&entry);
    }

    /// One JSON object per line, flushed immediately
    fn write_entry(&mut self, entry: &AuditEntry) {
        let Some(file) = self.log_file.as_mut() else {
            return;
        };

        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                error!("Cannot serialize audit entry: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            warn!("Cannot write audit entry: {}", e);
        }
    }

    fn redact_if_needed(&self, text: &str) -> String {
        if self.config.redact_secrets {
            redact_secrets(text)
        } else {
            text.to_string()
        }
    }

    /// Rotate once the log outgrows `max_log_size`
    pub fn maybe_rotate(&mut self) {
        if !self.config.enabled {
            return;
        }

        let size = fs::metadata(&self.config.log_path)
            .map(|meta| meta.len())
            .unwrap_or(0);
        if size > self.config.max_log_size {
            self.rotate_logs();
        }
    }

    /// Shift `log.N` to `log.N+1`, dropping the oldest, then start a fresh log
    fn rotate_logs(&mut self) {
        let path = self.config.log_path.clone();
        debug!("Rotating audit log {:?}", path);

        // Close before renaming
        self.log_file = None;
        for generation in (1..self.config.log_retention).rev() {
            let _ = fs::rename(
                rotated_path(&path, generation),
                rotated_path(&path, generation + 1),
            );
        }
        let _ = fs::rename(&path, rotated_path(&path, 1));

        self.log_file = Self::open_log_file(&path);
    }
}

fn rotated_path(path: &Path, generation: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", generation));
    PathBuf::from(name)
}

/// Replace anything that looks like a credential
fn redact_secrets(text: &str) -> String {
    SECRET_PATTERNS.iter().fold(text.to_string(), |redacted, pattern| {
        pattern.replace_all(&redacted, "[REDACTED]").into_owned()
    })
}
