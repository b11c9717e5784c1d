//! The push-and-run primitive.
//!
//! Removes any prior file at the remote path, streams the new content into
//! it through a privileged heredoc write (so the acting user need not own
//! the target path), marks it executable, runs it with elevated privileges,
//! and streams stdout/stderr back as the script produces them.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::shell::{OutputLine, RemoteError, RemoteSession};

/// Heredoc delimiter for remote file writes.
const HEREDOC_END: &str = "SCRIPT_END";

/// Capacity of the output channel between the session and the log loop.
const OUTPUT_BUFFER: usize = 64;

/// Push `content` to `remote_path` on the session's node and execute it.
///
/// Output lines are logged as they arrive and forwarded to `caller_sink`
/// when one is given. Fails on the first setup step that exits non-zero and
/// on a non-zero script exit.
pub async fn push_and_run(
    session: &mut dyn RemoteSession,
    content: &str,
    remote_path: &str,
    caller_sink: Option<mpsc::Sender<OutputLine>>,
) -> Result<(), RemoteError> {
    // Stale file from a previous run would otherwise survive a failed write.
    checked_exec(session, &format!("rm -f {}", remote_path)).await?;

    let write = format!(
        "cat <<'{end}' | sudo tee {path} > /dev/null\n{content}\n{end}\n",
        end = HEREDOC_END,
        path = remote_path,
        content = content,
    );
    debug!(path = %remote_path, bytes = content.len(), "Writing remote file");
    checked_exec(session, &write).await?;

    checked_exec(session, &format!("sudo chmod 755 {}", remote_path)).await?;

    let run = format!("sudo {}", remote_path);
    info!(path = %remote_path, "Executing remote script");

    let (tx, mut rx) = mpsc::channel(OUTPUT_BUFFER);
    let exec = session.exec_streaming(&run, tx);
    let forward = async {
        while let Some(line) = rx.recv().await {
            match &line {
                OutputLine::Stdout(text) => debug!(path = %remote_path, "STDOUT: {}", text),
                OutputLine::Stderr(text) => warn!(path = %remote_path, "STDERR: {}", text),
            }
            if let Some(sink) = &caller_sink {
                if sink.send(line).await.is_err() {
                    // Caller stopped listening; keep draining for the logs.
                }
            }
        }
    };

    let (exit_code, ()) = tokio::join!(exec, forward);
    let exit_code = exit_code?;

    if exit_code != 0 {
        return Err(RemoteError::Command {
            command: run,
            exit_code,
        });
    }

    info!(path = %remote_path, "Remote script completed");
    Ok(())
}

async fn checked_exec(session: &mut dyn RemoteSession, command: &str) -> Result<(), RemoteError> {
    let output = session.exec(command).await?;
    if !output.success() {
        warn!(
            command = %command,
            exit_code = output.exit_code,
            stderr = %output.stderr.trim(),
            "Remote setup command failed"
        );
        return Err(RemoteError::Command {
            command: command.to_string(),
            exit_code: output.exit_code,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockShell;
    use crate::shell::RemoteShell;
    use std::path::Path;

    #[tokio::test]
    async fn test_push_and_run_command_sequence() {
        let shell = MockShell::new();
        let mut session = shell
            .connect("198.51.100.1", 22, "azureuser", Path::new("/tmp/key"))
            .await
            .unwrap();

        push_and_run(session.as_mut(), "echo hi", "~/install.sh", None)
            .await
            .unwrap();
        session.close().await.unwrap();

        let commands = shell.commands();
        assert_eq!(commands[0], "rm -f ~/install.sh");
        assert!(commands[1].contains("sudo tee ~/install.sh"));
        assert!(commands[1].contains("echo hi"));
        assert_eq!(commands[2], "sudo chmod 755 ~/install.sh");
        assert_eq!(commands[3], "sudo ~/install.sh");
    }

    #[tokio::test]
    async fn test_push_and_run_surfaces_script_failure() {
        let shell = MockShell::new();
        shell.script_exit_code("sudo ~/broken.sh", 3);

        let mut session = shell
            .connect("198.51.100.1", 22, "azureuser", Path::new("/tmp/key"))
            .await
            .unwrap();
        let err = push_and_run(session.as_mut(), "exit 3", "~/broken.sh", None)
            .await
            .unwrap_err();
        session.close().await.unwrap();

        assert!(matches!(err, RemoteError::Command { exit_code: 3, .. }));
    }

    #[tokio::test]
    async fn test_push_and_run_forwards_output() {
        let shell = MockShell::new();
        shell.script_output("sudo ~/noisy.sh", &["line one", "line two"]);

        let mut session = shell
            .connect("198.51.100.1", 22, "azureuser", Path::new("/tmp/key"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        push_and_run(session.as_mut(), "echo", "~/noisy.sh", Some(tx))
            .await
            .unwrap();
        session.close().await.unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec![
                OutputLine::Stdout("line one".to_string()),
                OutputLine::Stdout("line two".to_string()),
            ]
        );
    }
}
