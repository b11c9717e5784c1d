//! Per-node remote operations.
//!
//! `RemoteConfigurator` owns the transport, the key reference, and the
//! operation timeout; every operation opens a session, does its work, and
//! closes the session on success and failure alike.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use skylift_topology::{NodeRecord, NodeRole};

use crate::push::push_and_run;
use crate::shell::{RemoteError, RemoteSession, RemoteShell};
use crate::template::{render, RoleContext};

/// Start command for the coordinator service.
const START_COORDINATOR: &str = "/opt/spark/sbin/start-master.sh";
/// Start command for a worker; the coordinator address is appended.
const START_WORKER: &str = "/opt/spark/sbin/start-worker.sh";
/// Port workers use to join the coordinator.
const CLUSTER_PORT: u16 = 7077;

/// Errors from remote configuration.
#[derive(Debug, Error)]
pub enum ConfigureError {
    /// Invalid or incomplete caller input (bad node name, missing file).
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Remote configuration operations over an abstract shell.
pub struct RemoteConfigurator {
    shell: std::sync::Arc<dyn RemoteShell>,
    key_path: PathBuf,
    port: u16,
    op_timeout: Duration,
}

impl RemoteConfigurator {
    pub fn new(shell: std::sync::Arc<dyn RemoteShell>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            shell,
            key_path: key_path.into(),
            port: 22,
            op_timeout: Duration::from_secs(900),
        }
    }

    /// Override the per-operation timeout (default 15 minutes).
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Template and run every `*.sh` in `scripts_dir` on the node.
    pub async fn install_dependencies(
        &self,
        node: &NodeRecord,
        private_ip: IpAddr,
        scripts_dir: &Path,
        zone: &str,
        pattern: &str,
    ) -> Result<(), ConfigureError> {
        let role = match node.role {
            NodeRole::Coordinator => RoleContext::Coordinator {
                private_ip,
                pattern,
                zone,
            },
            NodeRole::Worker => {
                let index = node.worker_index().ok_or_else(|| {
                    ConfigureError::Config(format!(
                        "worker {:?} has no trailing numeric suffix",
                        node.name
                    ))
                })?;
                RoleContext::Worker {
                    private_ip,
                    index,
                    pattern,
                    zone,
                }
            }
        };

        let mut scripts: Vec<PathBuf> = fs::read_dir(scripts_dir)
            .map_err(|e| {
                ConfigureError::Config(format!(
                    "scripts directory {:?}: {}",
                    scripts_dir.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "sh"))
            .collect();
        scripts.sort();

        info!(
            node = %node.name,
            scripts = scripts.len(),
            "Installing dependencies"
        );

        let mut session = self.open(node).await?;
        let result = self
            .install_on_session(session.as_mut(), node, &role, &scripts)
            .await;
        let _ = session.close().await;
        result
    }

    async fn install_on_session(
        &self,
        session: &mut dyn RemoteSession,
        node: &NodeRecord,
        role: &RoleContext<'_>,
        scripts: &[PathBuf],
    ) -> Result<(), ConfigureError> {
        for path in scripts {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ConfigureError::Config(format!("unusable script path {:?}", path)))?;
            let content = fs::read_to_string(path)
                .map_err(|e| ConfigureError::Config(format!("script {:?}: {}", path.display(), e)))?;
            let rendered = render(&content, &node.user, role);

            info!(node = %node.name, script = %file_name, "Pushing install script");
            self.bounded(&node.name, push_and_run(session, &rendered, &format!("~/{}", file_name), None))
                .await?;
        }
        Ok(())
    }

    /// Start the coordinator service on its node.
    pub async fn start_coordinator(&self, node: &NodeRecord) -> Result<(), ConfigureError> {
        info!(node = %node.name, "Starting coordinator service");
        self.run_command(node, START_COORDINATOR.to_string()).await
    }

    /// Start a worker service, joining it to the coordinator.
    pub async fn start_worker(
        &self,
        node: &NodeRecord,
        coordinator_addr: IpAddr,
    ) -> Result<(), ConfigureError> {
        let command = format!(
            "{} spark://{}:{}",
            START_WORKER, coordinator_addr, CLUSTER_PORT
        );
        info!(node = %node.name, coordinator = %coordinator_addr, "Starting worker service");
        self.run_command(node, command).await
    }

    /// Copy a local private credential to the node's default key path.
    pub async fn inject_devops_credential(
        &self,
        node: &NodeRecord,
        local_key_path: &Path,
    ) -> Result<(), ConfigureError> {
        let content = fs::read_to_string(local_key_path).map_err(|e| {
            ConfigureError::Config(format!(
                "devops credential {:?}: {}",
                local_key_path.display(),
                e
            ))
        })?;

        let remote_key = format!("/home/{}/.ssh/id_rsa", node.user);
        let write = format!(
            "cat <<'KEY_END' | tee {} > /dev/null\n{}\nKEY_END\n",
            remote_key, content
        );

        let mut session = self.open(node).await?;
        let result = async {
            checked(session.as_mut(), &write).await?;
            checked(session.as_mut(), &format!("sudo chmod 400 {}", remote_key)).await?;
            checked(
                session.as_mut(),
                &format!("mkdir -p /home/{}/projects", node.user),
            )
            .await?;
            Ok::<(), ConfigureError>(())
        };
        let result = self.bounded(&node.name, result).await;
        let _ = session.close().await;

        if result.is_ok() {
            info!(node = %node.name, "Devops credential injected");
        }
        result
    }

    async fn run_command(&self, node: &NodeRecord, command: String) -> Result<(), ConfigureError> {
        let mut session = self.open(node).await?;
        let result = self
            .bounded(&node.name, async {
                checked(session.as_mut(), &command).await
            })
            .await;
        let _ = session.close().await;
        result
    }

    async fn open(&self, node: &NodeRecord) -> Result<Box<dyn RemoteSession>, ConfigureError> {
        let host = node.address.to_string();
        let session = self
            .bounded(
                &node.name,
                self.shell.connect(&host, self.port, &node.user, &self.key_path),
            )
            .await?;
        Ok(session)
    }

    /// Bound a remote future by the operation timeout.
    async fn bounded<T, E>(
        &self,
        node_name: &str,
        fut: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, ConfigureError>
    where
        ConfigureError: From<E>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(node = %node_name, seconds = self.op_timeout.as_secs(), "Remote operation timed out");
                Err(RemoteError::Timeout {
                    host: node_name.to_string(),
                    seconds: self.op_timeout.as_secs(),
                }
                .into())
            }
        }
    }
}

async fn checked(session: &mut dyn RemoteSession, command: &str) -> Result<(), ConfigureError> {
    let output = session.exec(command).await?;
    if !output.success() {
        return Err(RemoteError::Command {
            command: command.to_string(),
            exit_code: output.exit_code,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockShell;
    use std::io::Write;
    use std::sync::Arc;

    fn coordinator() -> NodeRecord {
        NodeRecord {
            name: "demo-master".to_string(),
            address: "198.51.100.1".parse().unwrap(),
            user: "azureuser".to_string(),
            role: NodeRole::Coordinator,
        }
    }

    fn worker(n: u32) -> NodeRecord {
        NodeRecord {
            name: format!("demo-worker-{}", n),
            address: "198.51.100.2".parse().unwrap(),
            user: "azureuser".to_string(),
            role: NodeRole::Worker,
        }
    }

    fn configurator(shell: &Arc<MockShell>) -> RemoteConfigurator {
        RemoteConfigurator::new(Arc::clone(shell) as Arc<dyn RemoteShell>, "/tmp/key")
            .with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_install_templates_worker_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("10-deps.sh")).unwrap();
        writeln!(f, "#!/bin/bash").unwrap();
        writeln!(f, "USER={{{{{{USERNAME}}}}}}").unwrap();
        writeln!(f, "{{{{{{CONFIG_LINE_1}}}}}}").unwrap();
        writeln!(f, "{{{{{{CONFIG_LINE_2}}}}}}").unwrap();
        writeln!(f, "{{{{{{CONFIG_LINE_3}}}}}}").unwrap();

        let shell = Arc::new(MockShell::new());
        let cfg = configurator(&shell);

        cfg.install_dependencies(
            &worker(3),
            "10.0.0.7".parse().unwrap(),
            dir.path(),
            "example.com",
            "cluster.spark",
        )
        .await
        .unwrap();

        let pushed = shell
            .commands()
            .into_iter()
            .find(|c| c.contains("sudo tee ~/10-deps.sh"))
            .expect("script pushed");
        assert!(pushed.contains("USER=azureuser"));
        assert!(pushed.contains("export SPARK_LOCAL_IP=10.0.0.7"));
        assert!(pushed.contains("export SPARK_PUBLIC_DNS=cluster.spark.worker.3.example.com"));
    }

    #[tokio::test]
    async fn test_install_rejects_worker_without_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(MockShell::new());
        let cfg = configurator(&shell);

        let mut node = worker(1);
        node.name = "demo-worker".to_string();

        let err = cfg
            .install_dependencies(
                &node,
                "10.0.0.7".parse().unwrap(),
                dir.path(),
                "example.com",
                "cluster.spark",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigureError::Config(_)));
        // Nothing was pushed.
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_start_worker_encodes_coordinator_address() {
        let shell = Arc::new(MockShell::new());
        let cfg = configurator(&shell);

        cfg.start_worker(&worker(1), "10.0.0.4".parse().unwrap())
            .await
            .unwrap();

        assert!(shell
            .commands()
            .contains(&"/opt/spark/sbin/start-worker.sh spark://10.0.0.4:7077".to_string()));
    }

    #[tokio::test]
    async fn test_inject_credential_requires_local_file() {
        let shell = Arc::new(MockShell::new());
        let cfg = configurator(&shell);

        let err = cfg
            .inject_devops_credential(&coordinator(), Path::new("/nonexistent/id_rsa"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigureError::Config(_)));
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_inject_credential_sets_restrictive_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("id_rsa");
        std::fs::write(&key_path, "PRIVATE KEY MATERIAL").unwrap();

        let shell = Arc::new(MockShell::new());
        let cfg = configurator(&shell);

        cfg.inject_devops_credential(&coordinator(), &key_path)
            .await
            .unwrap();

        let commands = shell.commands();
        assert!(commands.iter().any(|c| c.contains("tee /home/azureuser/.ssh/id_rsa")
            && c.contains("PRIVATE KEY MATERIAL")));
        assert!(commands.contains(&"sudo chmod 400 /home/azureuser/.ssh/id_rsa".to_string()));
        assert!(commands.contains(&"mkdir -p /home/azureuser/projects".to_string()));
    }

    #[tokio::test]
    async fn test_auth_failure_is_surfaced() {
        let shell = Arc::new(MockShell::new());
        shell.fail_auth();
        let cfg = configurator(&shell);

        let err = cfg.start_coordinator(&coordinator()).await.unwrap_err();
        assert!(matches!(
            err,
            ConfigureError::Remote(RemoteError::Auth { .. })
        ));
    }
}
