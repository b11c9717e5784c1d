//! Transport backed by the system `ssh` binary.
//!
//! Each exec spawns one `ssh` process in batch mode with key authentication.
//! OpenSSH reserves exit code 255 for its own failures; its stderr is used
//! to tell an authentication failure from a transport failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::shell::{ExecOutput, OutputLine, RemoteError, RemoteSession, RemoteShell};

/// OpenSSH exit code for connection/authentication errors.
const SSH_ERROR_EXIT: i32 = 255;

/// `RemoteShell` implementation shelling out to `ssh`.
pub struct OpenSshShell;

impl OpenSshShell {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenSshShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteShell for OpenSshShell {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        user: &str,
        key_path: &Path,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let mut session = OpenSshSession {
            binary: PathBuf::from("ssh"),
            host: host.to_string(),
            port,
            user: user.to_string(),
            key_path: key_path.to_path_buf(),
        };

        // Probe the connection once so auth failures surface at connect
        // time, the way a persistent transport would report them.
        let probe = session.exec("true").await?;
        if !probe.success() {
            return Err(session.classify_failure(probe.exit_code, &probe.stderr));
        }

        info!(host = %host, user = %user, "SSH connection established");
        Ok(Box::new(session))
    }
}

struct OpenSshSession {
    binary: PathBuf,
    host: String,
    port: u16,
    user: String,
    key_path: PathBuf,
}

impl OpenSshSession {
    fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        // A timed-out exec drops the future mid-flight; the child must die
        // with it instead of holding the connection open.
        cmd.kill_on_drop(true);
        cmd.arg("-i")
            .arg(&self.key_path)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg(format!("{}@{}", self.user, self.host))
            .arg(remote_command);
        cmd
    }

    fn classify_failure(&self, exit_code: i32, stderr: &str) -> RemoteError {
        if exit_code == SSH_ERROR_EXIT {
            if stderr.contains("Permission denied") {
                return RemoteError::Auth {
                    host: self.host.clone(),
                    user: self.user.clone(),
                    message: stderr.trim().to_string(),
                };
            }
            return RemoteError::Transport {
                host: self.host.clone(),
                message: stderr.trim().to_string(),
            };
        }
        RemoteError::Command {
            command: String::new(),
            exit_code,
        }
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, RemoteError> {
        debug!(host = %self.host, command = %command, "Executing remote command");

        let output = self.command(command).output().await?;
        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if exit_code == SSH_ERROR_EXIT {
            return Err(self.classify_failure(exit_code, &stderr));
        }

        Ok(ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }

    async fn exec_streaming(
        &mut self,
        command: &str,
        sink: mpsc::Sender<OutputLine>,
    ) -> Result<i32, RemoteError> {
        debug!(host = %self.host, command = %command, "Executing remote command (streaming)");

        let mut child = self
            .command(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let stdout_sink = sink.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stdout_sink.send(OutputLine::Stdout(line)).await.is_err() {
                    break;
                }
            }
        });

        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stderr_tail = String::new();
        while let Ok(Some(line)) = stderr_lines.next_line().await {
            stderr_tail = line.clone();
            if sink.send(OutputLine::Stderr(line)).await.is_err() {
                break;
            }
        }

        let status = child.wait().await?;
        let _ = stdout_task.await;

        let exit_code = status.code().unwrap_or(-1);
        if exit_code == SSH_ERROR_EXIT {
            return Err(self.classify_failure(exit_code, &stderr_tail));
        }
        Ok(exit_code)
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        // Nothing persistent to release; each exec is its own process.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn session_over(binary: PathBuf) -> OpenSshSession {
        OpenSshSession {
            binary,
            host: "localhost".to_string(),
            port: 22,
            user: "nobody".to_string(),
            key_path: PathBuf::from("/dev/null"),
        }
    }

    #[tokio::test]
    async fn test_timed_out_exec_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-ssh");
        std::fs::write(&fake, "#!/bin/sh\necho $$ > \"$0.pid\"\nsleep 600\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut session = session_over(fake.clone());
        let (tx, _rx) = mpsc::channel(8);
        let result =
            tokio::time::timeout(Duration::from_millis(300), session.exec_streaming("true", tx))
                .await;
        assert!(result.is_err(), "stub command should outlive the timeout");

        let pid_file = format!("{}.pid", fake.display());
        let mut pid = String::new();
        for _ in 0..50 {
            if let Ok(s) = std::fs::read_to_string(&pid_file) {
                let s = s.trim().to_string();
                if !s.is_empty() {
                    pid = s;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!pid.is_empty(), "stub command never started");

        // Dropping the timed-out future must take the child down with it;
        // a lingering zombie entry counts as dead.
        let mut alive = true;
        for _ in 0..50 {
            alive = match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Ok(stat) => !stat.contains(") Z"),
                Err(_) => false,
            };
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!alive, "child process survived the dropped exec");
    }
}
