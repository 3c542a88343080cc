use crate::config::NodeConfig;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// ssh exits with 255 when the failure is its own (dial, auth, protocol).
const SSH_TRANSPORT_FAILURE: i32 = 255;
/// sshpass: the remote rejected the password.
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// sshpass: host key unknown and ssh asked for confirmation.
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },
    #[error("failed to run command '{command}': {reason}")]
    Command { command: String, reason: String },
}

impl ExecError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Command { .. } => "command",
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, node: &NodeConfig, command: &str) -> Result<String, ExecError>;
}

#[derive(Debug, Clone)]
pub struct SshTransport {
    connect_timeout_secs: u64,
    sshpass_available: bool,
}

impl SshTransport {
    pub async fn new(connect_timeout_secs: u64) -> Self {
        let sshpass_available = Command::new("sshpass")
            .arg("-V")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok();
        if !sshpass_available {
            debug!("sshpass not found, password authentication is unavailable");
        }
        Self {
            connect_timeout_secs,
            sshpass_available,
        }
    }

    fn build_command(&self, node: &NodeConfig, command: &str) -> Result<Command, ExecError> {
        let mut cmd = match &node.password {
            Some(password) => {
                if !self.sshpass_available {
                    return Err(ExecError::Transport {
                        endpoint: node.endpoint(),
                        reason: "password authentication requires sshpass, which was not found in PATH"
                            .to_string(),
                    });
                }
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh");
                cmd.env("SSHPASS", password.expose_secret());
                cmd
            }
            None => {
                let mut cmd = Command::new("ssh");
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        };

        cmd.arg("-o").arg("StrictHostKeyChecking=no");
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        cmd.arg("-p").arg(node.port.to_string());
        if let Some(key) = node.identity_file.as_deref().filter(|k| !k.trim().is_empty()) {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", node.username, node.address));
        cmd.arg(command);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn execute(&self, node: &NodeConfig, command: &str) -> Result<String, ExecError> {
        let via_sshpass = node.password.is_some();
        let mut cmd = self.build_command(node, command)?;

        debug!(node = %node.endpoint(), command, "running remote command");
        let output = cmd.output().await.map_err(|err| ExecError::Transport {
            endpoint: node.endpoint(),
            reason: format!("failed to spawn ssh: {err}"),
        })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(
            &node.endpoint(),
            command,
            via_sshpass,
            output.status.code(),
            stderr.trim(),
        ))
    }
}

fn classify_failure(
    endpoint: &str,
    command: &str,
    via_sshpass: bool,
    code: Option<i32>,
    stderr: &str,
) -> ExecError {
    let Some(code) = code else {
        return ExecError::Command {
            command: command.to_string(),
            reason: "terminated by signal".to_string(),
        };
    };

    let transport_reason = match code {
        SSH_TRANSPORT_FAILURE => Some(stderr.to_string()),
        SSHPASS_BAD_PASSWORD if via_sshpass => Some("password rejected".to_string()),
        SSHPASS_HOST_KEY_UNKNOWN if via_sshpass => Some("host key is unknown".to_string()),
        _ => None,
    };

    match transport_reason {
        Some(reason) => ExecError::Transport {
            endpoint: endpoint.to_string(),
            reason: if reason.is_empty() {
                format!("ssh exited with status {code}")
            } else {
                reason
            },
        },
        None if stderr.is_empty() => ExecError::Command {
            command: command.to_string(),
            reason: format!("exit status {code}"),
        },
        None => ExecError::Command {
            command: command.to_string(),
            reason: format!("exit status {code}: {stderr}"),
        },
    }
}
