//! Scripted in-memory shell for tests.
//!
//! Records every executed command and returns scripted outputs. Sessions
//! share the shell's state so assertions can be made after they close.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::shell::{ExecOutput, OutputLine, RemoteError, RemoteSession, RemoteShell};

#[derive(Default)]
struct Inner {
    commands: Vec<String>,
    exit_codes: HashMap<String, i32>,
    outputs: HashMap<String, Vec<String>>,
    fail_auth: bool,
    open_sessions: usize,
    closed_sessions: usize,
}

/// Mock transport.
#[derive(Default)]
pub struct MockShell {
    inner: Arc<Mutex<Inner>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect fail authentication.
    pub fn fail_auth(&self) {
        self.inner.lock().unwrap().fail_auth = true;
    }

    /// Script a non-zero exit code for an exact command.
    pub fn script_exit_code(&self, command: &str, exit_code: i32) {
        self.inner
            .lock()
            .unwrap()
            .exit_codes
            .insert(command.to_string(), exit_code);
    }

    /// Script stdout lines for an exact command.
    pub fn script_output(&self, command: &str, lines: &[&str]) {
        self.inner.lock().unwrap().outputs.insert(
            command.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    /// Every command executed across all sessions, in order.
    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().unwrap().commands.clone()
    }

    /// Number of sessions that were closed.
    pub fn closed_sessions(&self) -> usize {
        self.inner.lock().unwrap().closed_sessions
    }

    /// Number of sessions still open.
    pub fn open_sessions(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.open_sessions - inner.closed_sessions
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn connect(
        &self,
        host: &str,
        _port: u16,
        user: &str,
        _key_path: &Path,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_auth {
            return Err(RemoteError::Auth {
                host: host.to_string(),
                user: user.to_string(),
                message: "Permission denied (publickey)".to_string(),
            });
        }
        inner.open_sessions += 1;

        Ok(Box::new(MockSession {
            inner: Arc::clone(&self.inner),
            host: host.to_string(),
        }))
    }
}

struct MockSession {
    inner: Arc<Mutex<Inner>>,
    host: String,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, RemoteError> {
        debug!(host = %self.host, command = %command, "[MOCK] exec");
        let mut inner = self.inner.lock().unwrap();
        inner.commands.push(command.to_string());

        let exit_code = inner.exit_codes.get(command).copied().unwrap_or(0);
        let stdout = inner
            .outputs
            .get(command)
            .map(|lines| lines.join("\n"))
            .unwrap_or_default();
        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr: String::new(),
        })
    }

    async fn exec_streaming(
        &mut self,
        command: &str,
        sink: mpsc::Sender<OutputLine>,
    ) -> Result<i32, RemoteError> {
        debug!(host = %self.host, command = %command, "[MOCK] exec_streaming");
        let (exit_code, lines) = {
            let mut inner = self.inner.lock().unwrap();
            inner.commands.push(command.to_string());
            (
                inner.exit_codes.get(command).copied().unwrap_or(0),
                inner.outputs.get(command).cloned().unwrap_or_default(),
            )
        };

        for line in lines {
            if sink.send(OutputLine::Stdout(line)).await.is_err() {
                break;
            }
        }
        Ok(exit_code)
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        self.inner.lock().unwrap().closed_sessions += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_share_command_log() {
        let shell = MockShell::new();

        let mut a = shell
            .connect("198.51.100.1", 22, "u", Path::new("/k"))
            .await
            .unwrap();
        a.exec("first").await.unwrap();
        a.close().await.unwrap();

        let mut b = shell
            .connect("198.51.100.2", 22, "u", Path::new("/k"))
            .await
            .unwrap();
        b.exec("second").await.unwrap();
        b.close().await.unwrap();

        assert_eq!(shell.commands(), vec!["first", "second"]);
        assert_eq!(shell.closed_sessions(), 2);
        assert_eq!(shell.open_sessions(), 0);
    }
}
