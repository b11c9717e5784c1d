//! Firewall rule model.
//!
//! Rules are validated once at construction instead of at remote-call time:
//! a malformed rule never reaches the provider. Priorities order rules on
//! the provider side and must be unique within a group.

use crate::api::CloudError;

/// Priority range accepted by the provider.
const PRIORITY_RANGE: std::ops::RangeInclusive<u16> = 100..=4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Any,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "Tcp",
            Self::Udp => "Udp",
            Self::Any => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
        }
    }
}

/// A single validated firewall rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub name: String,
    pub protocol: Protocol,
    pub source_port_range: String,
    pub dest_port_range: String,
    pub source_prefix: String,
    pub dest_prefix: String,
    pub access: Access,
    pub direction: Direction,
    pub priority: u16,
}

impl FirewallRule {
    /// Build a rule, rejecting malformed input up front.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        protocol: Protocol,
        source_port_range: impl Into<String>,
        dest_port_range: impl Into<String>,
        source_prefix: impl Into<String>,
        dest_prefix: impl Into<String>,
        access: Access,
        direction: Direction,
        priority: u16,
    ) -> Result<Self, CloudError> {
        let rule = Self {
            name: name.into(),
            protocol,
            source_port_range: source_port_range.into(),
            dest_port_range: dest_port_range.into(),
            source_prefix: source_prefix.into(),
            dest_prefix: dest_prefix.into(),
            access,
            direction,
            priority,
        };

        if rule.name.is_empty() {
            return Err(CloudError::InvalidRule("rule name is empty".to_string()));
        }
        if rule.source_port_range.is_empty() || rule.dest_port_range.is_empty() {
            return Err(CloudError::InvalidRule(format!(
                "rule {:?} has an empty port range",
                rule.name
            )));
        }
        if rule.source_prefix.is_empty() || rule.dest_prefix.is_empty() {
            return Err(CloudError::InvalidRule(format!(
                "rule {:?} has an empty address prefix",
                rule.name
            )));
        }
        if !PRIORITY_RANGE.contains(&rule.priority) {
            return Err(CloudError::InvalidRule(format!(
                "rule {:?} priority {} outside {}..={}",
                rule.name,
                rule.priority,
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            )));
        }

        Ok(rule)
    }

    /// Inbound TCP allow from a single source address to one port.
    pub fn allow_inbound_tcp(
        name: impl Into<String>,
        source: &str,
        port: u16,
        priority: u16,
    ) -> Result<Self, CloudError> {
        Self::new(
            name,
            Protocol::Tcp,
            "*",
            port.to_string(),
            source,
            "*",
            Access::Allow,
            Direction::Inbound,
            priority,
        )
    }
}

/// Default rules for the coordinator group: SSH plus the cluster and
/// application UIs, all scoped to the caller's address.
pub fn default_coordinator_rules(caller_ip: &str) -> Result<Vec<FirewallRule>, CloudError> {
    Ok(vec![
        FirewallRule::allow_inbound_tcp("AllowSsh", caller_ip, 22, 200)?,
        FirewallRule::allow_inbound_tcp("AllowClusterUi", caller_ip, 8080, 210)?,
        FirewallRule::allow_inbound_tcp("AllowAppUi", caller_ip, 4040, 230)?,
    ])
}

/// Default rules for the worker group: SSH plus the worker UI.
pub fn default_worker_rules(caller_ip: &str) -> Result<Vec<FirewallRule>, CloudError> {
    Ok(vec![
        FirewallRule::allow_inbound_tcp("AllowSsh", caller_ip, 22, 200)?,
        FirewallRule::allow_inbound_tcp("AllowWorkerUi", caller_ip, 8081, 220)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_rule() {
        let rule = FirewallRule::allow_inbound_tcp("AllowSsh", "203.0.113.7", 22, 200).unwrap();
        assert_eq!(rule.dest_port_range, "22");
        assert_eq!(rule.access, Access::Allow);
        assert_eq!(rule.direction, Direction::Inbound);
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = FirewallRule::allow_inbound_tcp("", "203.0.113.7", 22, 200).unwrap_err();
        assert!(matches!(err, CloudError::InvalidRule(_)));
    }

    #[test]
    fn test_rejects_priority_out_of_range() {
        assert!(FirewallRule::allow_inbound_tcp("AllowSsh", "203.0.113.7", 22, 99).is_err());
        assert!(FirewallRule::allow_inbound_tcp("AllowSsh", "203.0.113.7", 22, 4097).is_err());
        assert!(FirewallRule::allow_inbound_tcp("AllowSsh", "203.0.113.7", 22, 4096).is_ok());
    }

    #[test]
    fn test_default_rule_sets() {
        let coordinator = default_coordinator_rules("203.0.113.7").unwrap();
        let worker = default_worker_rules("203.0.113.7").unwrap();

        assert_eq!(coordinator.len(), 3);
        assert_eq!(worker.len(), 2);

        // Priorities must be unique within each group.
        for rules in [&coordinator, &worker] {
            let mut priorities: Vec<u16> = rules.iter().map(|r| r.priority).collect();
            priorities.sort_unstable();
            priorities.dedup();
            assert_eq!(priorities.len(), rules.len());
        }
    }
}
