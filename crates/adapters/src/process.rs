//! Running external scanner binaries under a cancellation token

use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use patchscout_common::{AdapterError, ToolKind};

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command_line: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawn `program` and wait for it, killing the child if `cancel` fires first.
///
/// A missing binary is reported as [`AdapterError::Unavailable`].
pub async fn run_command(
    tool: ToolKind,
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<CommandOutput, AdapterError> {
    let command_line = std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    debug!(tool = %tool, command = %command_line, "spawning scanner process");

    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled);
    }

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                AdapterError::unavailable(tool.as_str(), format!("cannot execute '{}': {}", program, e))
            }
            _ => AdapterError::Io(e),
        })?;

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
        out = child.wait_with_output() => out?,
    };

    Ok(CommandOutput {
        command_line,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let cancel = CancellationToken::new();
        let err = run_command(
            ToolKind::Nmap,
            "/nonexistent/patchscout-test-binary",
            &[],
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn cancelled_before_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_command(ToolKind::Nikto, "true", &[], &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
