//! Remote configuration pipeline.
//!
//! One primitive carries every remote action in skylift: stream file content
//! to a node over a key-authenticated shell, mark it executable, run it with
//! elevated privileges, and stream its output back as it arrives. Dependency
//! installation, service start, and credential injection are all expressed
//! through that primitive plus a small template layer.
//!
//! ## Modules
//!
//! - `shell`: `RemoteShell`/`RemoteSession` traits and `RemoteError`
//! - `openssh`: transport shelling out to the system `ssh` binary
//! - `push`: the push-and-run primitive
//! - `template`: role-specific install-script templating
//! - `configurator`: per-node operations (install, start, credential)
//! - `mock`: scripted in-memory shell for tests

pub mod configurator;
pub mod mock;
pub mod openssh;
pub mod push;
pub mod shell;
pub mod template;

pub use configurator::{ConfigureError, RemoteConfigurator};
pub use mock::MockShell;
pub use openssh::OpenSshShell;
pub use push::push_and_run;
pub use shell::{ExecOutput, OutputLine, RemoteError, RemoteSession, RemoteShell};
