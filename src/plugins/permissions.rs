//! Permission negotiation
//!
//! Walks a command plugin's declared permission requests in order and turns
//! each one into a grant: satisfied by the command-line options, approved at
//! a console prompt, or rejected. The first rejection aborts the invocation.

use super::protocol::{GrantedOptions, NetworkScope, PermissionRequest, Plugin};
use crate::error::PermissionError;
use crate::logging::AuditLogger;
use crate::prompt::{is_affirmative, sanitize_for_terminal, Prompter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Grants gathered during negotiation, beyond the command-line options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiatedPermissions {
    pub writable_directories: Vec<PathBuf>,
    pub network_connections: Vec<NetworkScope>,
}

impl NegotiatedPermissions {
    fn add_writable(&mut self, dir: &Path) {
        if !self.writable_directories.iter().any(|d| d == dir) {
            self.writable_directories.push(dir.to_path_buf());
        }
    }

    fn add_network(&mut self, scope: NetworkScope) {
        if !self.network_connections.contains(&scope) {
            self.network_connections.push(scope);
        }
    }
}

/// Text describing what a request would allow, as shown to the user
pub fn permission_text(request: &PermissionRequest) -> String {
    match request {
        PermissionRequest::WriteToPackageDirectory { .. } => {
            "write to the package directory".to_string()
        }
        PermissionRequest::AllowNetworkConnections { scope, .. } => match scope.ports_description()
        {
            Some(ports) => format!("allow {} network connections {}", scope.label(), ports),
            None => format!("allow {} connections", scope.label()),
        },
    }
}

/// Command-line flag that grants `request` without a prompt
fn remedy(request: &PermissionRequest) -> String {
    match request {
        PermissionRequest::WriteToPackageDirectory { .. } => {
            "--allow-writing-to-package-directory".to_string()
        }
        PermissionRequest::AllowNetworkConnections { scope, .. } => {
            format!("--allow-network-connections {}", scope.permission())
        }
    }
}

fn reason(request: &PermissionRequest) -> &str {
    match request {
        PermissionRequest::WriteToPackageDirectory { reason }
        | PermissionRequest::AllowNetworkConnections { reason, .. } => reason,
    }
}

pub struct PermissionNegotiator<'a> {
    options: &'a GrantedOptions,
    prompter: &'a mut dyn Prompter,
    audit: Option<&'a mut AuditLogger>,
}

impl<'a> PermissionNegotiator<'a> {
    pub fn new(options: &'a GrantedOptions, prompter: &'a mut dyn Prompter) -> Self {
        Self {
            options,
            prompter,
            audit: None,
        }
    }

    /// Record prompt outcomes in `audit`
    pub fn with_audit(mut self, audit: &'a mut AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Negotiate every request `plugin` declares.
    ///
    /// Requests already covered by the options never prompt. The pre-approved
    /// network scope, if any, is always part of the result.
    pub fn negotiate(
        &mut self,
        plugin: &Plugin,
        package_root: &Path,
    ) -> Result<NegotiatedPermissions, PermissionError> {
        let mut granted = NegotiatedPermissions::default();
        if let Some(scope) = self.options.pre_approved_network.scope() {
            granted.add_network(scope);
        }

        for request in plugin.permission_requests() {
            match request {
                PermissionRequest::WriteToPackageDirectory { .. } => {
                    if self.options.allow_writing_to_package_directory {
                        debug!("Package writes pre-approved for '{}'", plugin.name);
                        continue;
                    }
                    self.request_approval(plugin, request)?;
                    granted.add_writable(package_root);
                }
                PermissionRequest::AllowNetworkConnections { scope, .. } => {
                    if *scope == NetworkScope::None {
                        continue;
                    }
                    if scope.permission() == self.options.pre_approved_network {
                        debug!(
                            "Network scope '{}' pre-approved for '{}'",
                            scope, plugin.name
                        );
                        continue;
                    }
                    self.request_approval(plugin, request)?;
                    granted.add_network(scope.clone());
                }
            }
        }

        Ok(granted)
    }

    fn request_approval(
        &mut self,
        plugin: &Plugin,
        request: &PermissionRequest,
    ) -> Result<(), PermissionError> {
        let permission = permission_text(request);
        let reason = reason(request);

        if !self.prompter.is_interactive() {
            warn!(
                "Cannot ask for permission to {} in a non-interactive session",
                permission
            );
            self.audit_denied(&plugin.name, &permission, "non-interactive session");
            return Err(PermissionError::Unavailable {
                plugin: plugin.name.clone(),
                permission,
                reason: reason.to_string(),
                remedy: remedy(request),
            });
        }

        let name = sanitize_for_terminal(&plugin.name);
        let message = format!(
            "Plugin '{name}' wants permission to {permission}.\nStated reason: \"{}\".\nAllow this plugin to {permission}? (yes/no) ",
            sanitize_for_terminal(reason)
        );

        let answer = match self.prompter.ask(&message) {
            Ok(answer) => answer,
            Err(e) => {
                self.audit_denied(&plugin.name, &permission, "no answer");
                return Err(PermissionError::Prompt(e.to_string()));
            }
        };

        if is_affirmative(&answer) {
            info!("User allowed '{}' to {}", plugin.name, permission);
            if let Some(audit) = self.audit.as_deref_mut() {
                audit.log_permission_granted(&plugin.name, &permission);
            }
            Ok(())
        } else {
            self.audit_denied(&plugin.name, &permission, "user declined");
            Err(PermissionError::Denied {
                plugin: plugin.name.clone(),
                permission,
            })
        }
    }

    fn audit_denied(&mut self, plugin: &str, permission: &str, why: &str) {
        if let Some(audit) = self.audit.as_deref_mut() {
            audit.log_permission_denied(plugin, permission, why);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::protocol::NetworkPermission;
    use crate::plugins::testing::command_plugin;
    use crate::prompt::testing::ScriptedPrompter;

    const ROOT: &str = "/work/demo";

    fn write_request(reason: &str) -> PermissionRequest {
        PermissionRequest::WriteToPackageDirectory {
            reason: reason.to_string(),
        }
    }

    fn network_request(scope: NetworkScope) -> PermissionRequest {
        PermissionRequest::AllowNetworkConnections {
            scope,
            reason: "fetches schemas".to_string(),
        }
    }

    fn negotiate(
        options: &GrantedOptions,
        prompter: &mut ScriptedPrompter,
        plugin: &Plugin,
    ) -> Result<NegotiatedPermissions, PermissionError> {
        PermissionNegotiator::new(options, prompter).negotiate(plugin, Path::new(ROOT))
    }

    #[test]
    fn test_no_requests_no_prompts() {
        let plugin = command_plugin("Formatter", "format", vec![]);
        let mut prompter = ScriptedPrompter::interactive(&[]);

        let granted = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap();
        assert_eq!(granted, NegotiatedPermissions::default());
        assert!(prompter.prompts.is_empty());
    }

    #[test]
    fn test_write_approved_at_prompt() {
        let plugin = command_plugin("Formatter", "format", vec![write_request("needs to reformat")]);
        let mut prompter = ScriptedPrompter::interactive(&["yes"]);

        let granted = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap();
        assert_eq!(granted.writable_directories, vec![PathBuf::from(ROOT)]);
        assert_eq!(prompter.prompts.len(), 1);

        let prompt = &prompter.prompts[0];
        assert!(prompt.contains("Plugin 'Formatter' wants permission to write to the package directory."));
        assert!(prompt.contains("Stated reason: \"needs to reformat\"."));
        assert!(prompt.ends_with("(yes/no) "));
    }

    #[test]
    fn test_write_pre_approved_skips_prompt() {
        let plugin = command_plugin("Formatter", "format", vec![write_request("needs to reformat")]);
        let mut prompter = ScriptedPrompter::interactive(&[]);
        let options = GrantedOptions {
            allow_writing_to_package_directory: true,
            ..GrantedOptions::default()
        };

        let granted = negotiate(&options, &mut prompter, &plugin).unwrap();
        assert!(granted.writable_directories.is_empty());
        assert!(prompter.prompts.is_empty());
    }

    #[test]
    fn test_anything_but_yes_denies() {
        for answer in ["no", "y", "", "sure"] {
            let plugin =
                command_plugin("Formatter", "format", vec![write_request("needs to reformat")]);
            let mut prompter = ScriptedPrompter::interactive(&[answer]);

            let err = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap_err();
            assert_eq!(
                err,
                PermissionError::Denied {
                    plugin: "Formatter".to_string(),
                    permission: "write to the package directory".to_string(),
                }
            );
        }
    }

    #[test]
    fn test_non_interactive_names_remedy() {
        let plugin = command_plugin("Formatter", "format", vec![write_request("needs to reformat")]);
        let mut prompter = ScriptedPrompter::non_interactive();

        let err = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap_err();
        assert!(prompter.prompts.is_empty());
        match err {
            PermissionError::Unavailable { reason, remedy, .. } => {
                assert_eq!(reason, "needs to reformat");
                assert_eq!(remedy, "--allow-writing-to-package-directory");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_interactive_network_remedy() {
        let plugin = command_plugin(
            "Uploader",
            "upload",
            vec![network_request(NetworkScope::UnixSocket)],
        );
        let mut prompter = ScriptedPrompter::non_interactive();

        let err = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap_err();
        assert!(matches!(
            err,
            PermissionError::Unavailable { ref remedy, .. }
                if remedy == "--allow-network-connections unix-domain-socket"
        ));
    }

    #[test]
    fn test_first_denial_stops_negotiation() {
        let plugin = command_plugin(
            "Uploader",
            "upload",
            vec![
                network_request(NetworkScope::All { ports: vec![443] }),
                write_request("records the upload"),
            ],
        );
        let mut prompter = ScriptedPrompter::interactive(&["no", "yes"]);

        assert!(negotiate(&GrantedOptions::default(), &mut prompter, &plugin).is_err());
        assert_eq!(prompter.prompts.len(), 1);
    }

    #[test]
    fn test_network_prompt_text() {
        let plugin = command_plugin(
            "Uploader",
            "upload",
            vec![
                network_request(NetworkScope::All { ports: vec![80, 443] }),
                network_request(NetworkScope::Docker),
            ],
        );
        let mut prompter = ScriptedPrompter::interactive(&["yes", "yes"]);

        let granted = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap();
        assert!(prompter.prompts[0]
            .contains("wants permission to allow all network connections on ports: 80, 443."));
        assert!(prompter.prompts[1]
            .contains("wants permission to allow docker unix domain socket connections."));
        assert_eq!(
            granted.network_connections,
            vec![NetworkScope::All { ports: vec![80, 443] }, NetworkScope::Docker]
        );
    }

    #[test]
    fn test_none_scope_is_skipped() {
        let plugin = command_plugin("Quiet", "quiet", vec![network_request(NetworkScope::None)]);
        let mut prompter = ScriptedPrompter::interactive(&[]);

        let granted = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap();
        assert!(granted.network_connections.is_empty());
        assert!(prompter.prompts.is_empty());
    }

    #[test]
    fn test_pre_approved_scope_seeds_result_once() {
        let plugin = command_plugin(
            "Uploader",
            "upload",
            vec![network_request(NetworkScope::Local { ports: vec![8080] })],
        );
        let mut prompter = ScriptedPrompter::interactive(&[]);
        let options = GrantedOptions {
            pre_approved_network: NetworkPermission::Local,
            ..GrantedOptions::default()
        };

        let granted = negotiate(&options, &mut prompter, &plugin).unwrap();
        assert!(prompter.prompts.is_empty());
        assert_eq!(
            granted.network_connections,
            vec![NetworkScope::Local { ports: vec![] }]
        );
    }

    #[test]
    fn test_pre_approval_is_not_by_breadth() {
        let plugin = command_plugin(
            "Uploader",
            "upload",
            vec![network_request(NetworkScope::Local { ports: vec![] })],
        );
        let mut prompter = ScriptedPrompter::non_interactive();
        let options = GrantedOptions {
            pre_approved_network: NetworkPermission::All,
            ..GrantedOptions::default()
        };

        let err = negotiate(&options, &mut prompter, &plugin).unwrap_err();
        assert!(matches!(err, PermissionError::Unavailable { .. }));
    }

    #[test]
    fn test_repeated_request_granted_once() {
        let plugin = command_plugin(
            "Formatter",
            "format",
            vec![write_request("first"), write_request("second")],
        );
        let mut prompter = ScriptedPrompter::interactive(&["yes", "yes"]);

        let granted = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap();
        assert_eq!(prompter.prompts.len(), 2);
        assert_eq!(granted.writable_directories, vec![PathBuf::from(ROOT)]);
    }

    #[test]
    fn test_prompt_text_is_sanitized() {
        let plugin = command_plugin(
            "Evil\x1b[2J",
            "evil",
            vec![write_request("trust me\x1b]0;pwned\x07")],
        );
        let mut prompter = ScriptedPrompter::interactive(&["no"]);

        let _ = negotiate(&GrantedOptions::default(), &mut prompter, &plugin);
        assert!(!prompter.prompts[0].contains('\x1b'));
        assert!(!prompter.prompts[0].contains('\x07'));
    }

    #[test]
    fn test_closed_input_is_prompt_error() {
        let plugin = command_plugin("Formatter", "format", vec![write_request("needs to reformat")]);
        let mut prompter = ScriptedPrompter::interactive(&[]);

        let err = negotiate(&GrantedOptions::default(), &mut prompter, &plugin).unwrap_err();
        assert!(matches!(err, PermissionError::Prompt(_)));
    }

    #[test]
    fn test_decisions_are_audited() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = crate::config::AuditConfig {
            enabled: true,
            log_path: dir.path().join("audit.log"),
            ..crate::config::AuditConfig::default()
        };
        let log_path = config.log_path.clone();
        let mut audit = AuditLogger::new(config);

        let plugin = command_plugin("Formatter", "format", vec![write_request("needs to reformat")]);
        let options = GrantedOptions::default();
        let mut prompter = ScriptedPrompter::interactive(&["yes"]);
        PermissionNegotiator::new(&options, &mut prompter)
            .with_audit(&mut audit)
            .negotiate(&plugin, Path::new(ROOT))
            .unwrap();
        drop(audit);

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("\"permission_granted\""));
        assert!(content.contains("write to the package directory"));
    }
}
