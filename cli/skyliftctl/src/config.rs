//! Configuration file handling.
//!
//! The whole cluster is described by one TOML file. Lookup order: the
//! `--config` flag (or `SKYLIFT_CONFIG`), then `./skylift.toml`, then the
//! user config directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use skylift_cloud::OsImage;
use skylift_orchestrator::ClusterSpec;

use crate::error::CliError;

/// Configuration file name.
const CONFIG_FILE: &str = "skylift.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cluster: ClusterSection,
    pub dns: DnsSection,
    pub paths: PathsSection,
}

/// The `[cluster]` section, mapping onto the create inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSection {
    pub name: String,
    #[serde(default)]
    pub worker_count: u32,
    pub coordinator_size: String,
    #[serde(default)]
    pub worker_size: Option<String>,
    pub resource_group: String,
    #[serde(default)]
    pub vnet_resource_group: Option<String>,
    pub vnet_name: String,
    pub subnet_name: String,
    pub ssh_key_name: String,
    pub region: String,
    pub coordinator_user: String,
    #[serde(default)]
    pub worker_user: Option<String>,
    /// Public address the firewall rules admit (your workstation or CI).
    pub caller_ip: String,
    #[serde(default)]
    pub coordinator_group: Option<String>,
    #[serde(default)]
    pub worker_group: Option<String>,
}

/// The `[dns]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsSection {
    /// Delegated zone the records are published under.
    pub zone: String,
    pub zone_id: String,
    /// Leading label of every published hostname.
    pub pattern: String,
    /// API token; `CLOUDFLARE_API_TOKEN` takes precedence.
    #[serde(default)]
    pub api_token: Option<String>,
}

/// The `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Directory holding the topology tables. Defaults to the CWD.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Directory of `*.sh` install scripts.
    pub scripts_dir: PathBuf,
    /// Private key matching the provider SSH key asset.
    pub ssh_key_path: PathBuf,
    /// Private key pushed to nodes for repository access.
    pub devops_key_path: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load from an explicit path, or walk the lookup order.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::find()?,
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    fn find() -> Result<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }

        if let Some(dirs) = ProjectDirs::from("com", "skylift", "skylift") {
            let path = dirs.config_dir().join(CONFIG_FILE);
            if path.exists() {
                return Ok(path);
            }
        }

        Err(CliError::NoConfig.into())
    }

    /// Resolve the DNS token from the environment or the config file.
    pub fn dns_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var("CLOUDFLARE_API_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }
        self.dns
            .api_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CliError::MissingDnsToken.into())
    }

    /// Build the cluster spec from the `[cluster]` section.
    pub fn to_spec(&self) -> ClusterSpec {
        let c = &self.cluster;
        ClusterSpec {
            name: c.name.clone(),
            worker_count: c.worker_count,
            coordinator_size: c.coordinator_size.clone(),
            worker_size: c.worker_size.clone(),
            resource_group: c.resource_group.clone(),
            vnet_resource_group: c.vnet_resource_group.clone(),
            vnet_name: c.vnet_name.clone(),
            subnet_name: c.subnet_name.clone(),
            ssh_key_name: c.ssh_key_name.clone(),
            region: c.region.clone(),
            coordinator_user: c.coordinator_user.clone(),
            worker_user: c.worker_user.clone(),
            caller_ip: c.caller_ip.clone(),
            coordinator_group: c.coordinator_group.clone(),
            worker_group: c.worker_group.clone(),
            image: OsImage::default(),
            coordinator_rules: None,
            worker_rules: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[cluster]
name = "demo"
worker_count = 2
coordinator_size = "Standard_B2s"
resource_group = "rg"
vnet_name = "vnet"
subnet_name = "subnet"
ssh_key_name = "ops-key"
region = "westeurope"
coordinator_user = "azureuser"
caller_ip = "203.0.113.7"

[dns]
zone = "example.com"
zone_id = "zone123"
pattern = "demo"

[paths]
scripts_dir = "./scripts"
ssh_key_path = "/home/me/.ssh/id_rsa"
devops_key_path = "/home/me/.ssh/devops_rsa"
"#;

    #[test]
    fn test_parse_and_map_to_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skylift.toml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        let spec = config.to_spec();

        assert_eq!(spec.name, "demo");
        assert_eq!(spec.worker_count, 2);
        assert_eq!(spec.worker_size(), "Standard_B2s");
        assert_eq!(spec.worker_user(), "azureuser");
        assert!(spec.validate().is_ok());

        assert_eq!(config.dns.zone, "example.com");
        assert_eq!(config.paths.state_dir, PathBuf::from("."));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/skylift.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
