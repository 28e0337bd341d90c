//! Shared command runner for recovery actions
//!
//! Runs an external command under a hard deadline, killing the process on
//! expiry, and always returns captured stdout/stderr so diagnostics can be
//! attached to escalation notifications.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

use crate::domain::NodeDescriptor;
use crate::error::ActionError;

/// Command line plus deadline. The command string is split on whitespace;
/// anything needing shell semantics should be wrapped in a script.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Parse a rendered command line into program + args.
    pub fn parse(line: &str, timeout: Duration) -> Result<Self, ActionError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ActionError::Misconfigured("empty command template".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished (or killed) command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the deadline expired and the process was killed
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_status == Some(0)
    }

    /// Combined diagnostic suitable for attempt records.
    pub fn detail(&self) -> String {
        let mut parts = Vec::new();
        if self.timed_out {
            parts.push("killed on timeout".to_string());
        }
        if !self.stdout.trim().is_empty() {
            parts.push(format!("stdout: {}", self.stdout.trim()));
        }
        if !self.stderr.trim().is_empty() {
            parts.push(format!("stderr: {}", self.stderr.trim()));
        }
        if parts.is_empty() {
            parts.push("no output".to_string());
        }
        parts.join("; ")
    }
}

/// Substitute node fields into a command template. Recognized placeholders:
/// `{node_id}`, `{host}`, `{port}`, `{service}`, `{kind}`.
pub fn render_template(template: &str, node: &NodeDescriptor) -> String {
    template
        .replace("{node_id}", &node.node_id)
        .replace("{host}", &node.address.host)
        .replace("{port}", &node.address.port.to_string())
        .replace("{service}", node.kind.service_unit())
        .replace("{kind}", &node.kind.to_string())
}

/// Run the command under its deadline. Spawn failures are the only error
/// path; a non-zero exit or a timeout kill still produces a
/// `CommandOutput`.
pub async fn run_command(spec: &CommandSpec) -> Result<CommandOutput, ActionError> {
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ActionError::Spawn {
            command: spec.display(),
            source,
        })?;

    // Drain the pipes concurrently with the wait: a child that fills the
    // pipe buffer must not deadlock the runner, and output written before a
    // timeout kill is still captured.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = stdout_pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    let waited = tokio::time::timeout(spec.timeout, child.wait()).await;

    let (timed_out, exit_status) = match waited {
        Ok(Ok(status)) => (false, status.code()),
        Ok(Err(e)) => {
            warn!(command = %spec.display(), "wait failed: {e}");
            (false, None)
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(command = %spec.display(), "kill after timeout failed: {e}");
            }
            (true, None)
        }
    };

    // The kill (or natural exit) closes the pipes, so these finish promptly.
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        exit_status,
        stdout,
        stderr,
        timed_out,
    })
}
