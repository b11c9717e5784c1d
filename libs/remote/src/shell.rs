//! Remote shell traits.
//!
//! The raw transport is a collaborator behind `RemoteShell`; skylift only
//! assumes connect/exec/close semantics. Authentication failures are
//! distinguished from transport failures because they are never retried.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from remote shell operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("authentication failed for {user}@{host}: {message}")]
    Auth {
        host: String,
        user: String,
        message: String,
    },

    #[error("transport failure to {host}: {message}")]
    Transport { host: String, message: String },

    #[error("remote command failed with exit code {exit_code}: {command}")]
    Command { command: String, exit_code: i32 },

    #[error("remote operation timed out after {seconds}s on {host}")]
    Timeout { host: String, seconds: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of remote output, as it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Buffered result of a short remote command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An open session against one node.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a short command and buffer its output.
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, RemoteError>;

    /// Run a command, forwarding stdout/stderr lines as they arrive.
    ///
    /// Returns the command's exit code; the sink is dropped when the
    /// command finishes.
    async fn exec_streaming(
        &mut self,
        command: &str,
        sink: mpsc::Sender<OutputLine>,
    ) -> Result<i32, RemoteError>;

    /// Release the session. Must be called on every path; implementations
    /// must tolerate a second call.
    async fn close(&mut self) -> Result<(), RemoteError>;
}

/// Connection factory for remote sessions.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        user: &str,
        key_path: &Path,
    ) -> Result<Box<dyn RemoteSession>, RemoteError>;
}
