//! CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use skylift_cloud::{AzCliCloud, CloudApi, MockCloud};
use skylift_dns::{CloudflareApi, DnsApi, MockDns};
use skylift_orchestrator::{ClusterOrchestrator, CreateReport};
use skylift_remote::{OpenSshShell, RemoteConfigurator, RemoteShell};
use skylift_topology::FileStore;

use crate::config::Config;

/// skylift - provision and manage coordinator/worker clusters.
#[derive(Debug, Parser)]
#[command(name = "skylift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, env = "SKYLIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Run against in-memory providers instead of the cloud.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision the cluster and persist its topology.
    Create,

    /// Tear down every recorded node and security group.
    Delete,

    /// Push and run the install scripts on every node.
    InstallDeps,

    /// Start the coordinator and join the workers to it.
    Start,

    /// Publish a DNS record for every node.
    ConfigureDns,

    /// Install the devops credential on every node.
    ConfigureDevops,

    /// Run create, install, start, DNS, and devops in sequence.
    Orchestrate,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        let spec = config.to_spec();

        let cloud: Arc<dyn CloudApi> = if self.dry_run {
            Arc::new(MockCloud::new())
        } else {
            Arc::new(AzCliCloud::new())
        };
        let dns: Arc<dyn DnsApi> = if self.dry_run {
            Arc::new(MockDns::new())
        } else {
            // Commands that never touch DNS still work without a token.
            let token = config.dns_token().unwrap_or_default();
            Arc::new(CloudflareApi::new(config.dns.zone_id.clone(), token))
        };

        let shell: Arc<dyn RemoteShell> = Arc::new(OpenSshShell::new());
        let configurator = RemoteConfigurator::new(shell, &config.paths.ssh_key_path);
        let store = Arc::new(FileStore::new(&config.paths.state_dir));
        let orchestrator = ClusterOrchestrator::new(cloud, store, configurator, dns);

        match self.command {
            Commands::Create => {
                let report = orchestrator.create(&spec).await?;
                print_report(&report);
            }
            Commands::Delete => {
                orchestrator.delete(&spec).await?;
                println!("{} cluster {} deleted", "ok:".green().bold(), spec.name);
            }
            Commands::InstallDeps => {
                orchestrator
                    .install_dependencies(
                        &spec,
                        &config.paths.scripts_dir,
                        &config.dns.zone,
                        &config.dns.pattern,
                    )
                    .await?;
                println!("{} dependencies installed", "ok:".green().bold());
            }
            Commands::Start => {
                orchestrator.start(&spec).await?;
                println!("{} cluster services started", "ok:".green().bold());
            }
            Commands::ConfigureDns => {
                if !self.dry_run {
                    config.dns_token()?;
                }
                orchestrator
                    .publish_dns(&config.dns.pattern, &config.dns.zone)
                    .await?;
                println!("{} DNS records published", "ok:".green().bold());
            }
            Commands::ConfigureDevops => {
                orchestrator
                    .configure_devops(&config.paths.devops_key_path)
                    .await?;
                println!("{} devops credential installed", "ok:".green().bold());
            }
            Commands::Orchestrate => {
                if !self.dry_run {
                    config.dns_token()?;
                }
                orchestrator
                    .orchestrate_all(
                        &spec,
                        &config.paths.scripts_dir,
                        &config.dns.zone,
                        &config.dns.pattern,
                        &config.paths.devops_key_path,
                    )
                    .await?;
                println!("{} cluster {} fully orchestrated", "ok:".green().bold(), spec.name);
            }
        }

        Ok(())
    }
}

fn print_report(report: &CreateReport) {
    let line = |outcome: &skylift_orchestrator::NodeOutcome| {
        if outcome.ok {
            let address = outcome
                .address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {} {} {}", "up".green(), outcome.name, address);
        } else {
            println!("  {} {}", "failed".red(), outcome.name);
        }
    };

    println!("coordinator:");
    line(&report.coordinator);
    if !report.workers.is_empty() {
        println!("workers:");
        for worker in &report.workers {
            line(worker);
        }
    }

    if report.ok() {
        println!("{} cluster is up", "ok:".green().bold());
    } else {
        println!(
            "{} some nodes failed to provision; inspect and re-create or delete",
            "warning:".yellow().bold()
        );
    }
}
