//! Install-script templating.
//!
//! Scripts in the dependency directory carry placeholders that are filled
//! per node before the push: the login user always, then three role lines
//! wiring the Spark environment for a coordinator or a worker.

use std::net::IpAddr;

const USERNAME: &str = "{{{USERNAME}}}";
const CONFIG_LINE_1: &str = "{{{CONFIG_LINE_1}}}";
const CONFIG_LINE_2: &str = "{{{CONFIG_LINE_2}}}";
const CONFIG_LINE_3: &str = "{{{CONFIG_LINE_3}}}";

/// Role-specific values substituted into a script.
#[derive(Debug, Clone)]
pub enum RoleContext<'a> {
    Coordinator {
        private_ip: IpAddr,
        pattern: &'a str,
        zone: &'a str,
    },
    Worker {
        private_ip: IpAddr,
        index: u32,
        pattern: &'a str,
        zone: &'a str,
    },
}

/// Render a script for one node.
pub fn render(script: &str, user: &str, role: &RoleContext) -> String {
    let rendered = script.replace(USERNAME, user);

    let (line1, line2, line3) = match role {
        RoleContext::Coordinator {
            private_ip,
            pattern,
            zone,
        } => (
            "export SPARK_DRIVER_BIND_ADDRESS=0.0.0.0".to_string(),
            format!("export SPARK_DRIVER_HOST={}", private_ip),
            format!("SPARK_PUBLIC_DNS={}.driver.{}", pattern, zone),
        ),
        RoleContext::Worker {
            private_ip,
            index,
            pattern,
            zone,
        } => (
            format!("export SPARK_LOCAL_IP={}", private_ip),
            format!("export SPARK_PUBLIC_DNS={}.worker.{}.{}", pattern, index, zone),
            String::new(),
        ),
    };

    rendered
        .replace(CONFIG_LINE_1, &line1)
        .replace(CONFIG_LINE_2, &line2)
        .replace(CONFIG_LINE_3, &line3)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
#!/bin/bash
HOME_DIR=/home/{{{USERNAME}}}
{{{CONFIG_LINE_1}}}
{{{CONFIG_LINE_2}}}
{{{CONFIG_LINE_3}}}
";

    #[test]
    fn test_render_coordinator() {
        let role = RoleContext::Coordinator {
            private_ip: "10.0.0.4".parse().unwrap(),
            pattern: "cluster.spark",
            zone: "example.com",
        };
        let out = render(SCRIPT, "azureuser", &role);

        assert!(out.contains("HOME_DIR=/home/azureuser"));
        assert!(out.contains("export SPARK_DRIVER_BIND_ADDRESS=0.0.0.0"));
        assert!(out.contains("export SPARK_DRIVER_HOST=10.0.0.4"));
        assert!(out.contains("SPARK_PUBLIC_DNS=cluster.spark.driver.example.com"));
        assert!(!out.contains("{{{"));
    }

    #[test]
    fn test_render_worker_uses_numeric_suffix() {
        // A worker named demo-worker-3 renders its index into the DNS name
        // and its local IP from the node's assigned address.
        let role = RoleContext::Worker {
            private_ip: "10.0.0.7".parse().unwrap(),
            index: 3,
            pattern: "cluster.spark",
            zone: "example.com",
        };
        let out = render(SCRIPT, "worker", &role);

        assert!(out.contains("export SPARK_LOCAL_IP=10.0.0.7"));
        assert!(out.contains("export SPARK_PUBLIC_DNS=cluster.spark.worker.3.example.com"));
        // The third line is empty for workers.
        assert!(out.contains("export SPARK_PUBLIC_DNS=cluster.spark.worker.3.example.com\n\n"));
    }
}
