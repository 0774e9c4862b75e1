//! Typed view of the Terraform variables file.
//!
//! The orchestrator reads `terraform/variables.tfvars` once at startup and
//! passes the resulting [`DeployVars`] explicitly into every stage, so
//! nothing downstream consults the environment.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

/// Cluster identity and firewall scope for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployVars {
    pub project: String,
    pub region: String,
    pub zone: String,
    pub cluster_name: String,
    /// Operator's public IP; the firewall rule admits exactly this address.
    pub public_ip: String,
}

impl DeployVars {
    /// Load and validate the variables file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read variables file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid variables file {}", path.display()))
    }

    /// Parse `key = "value"` lines. Unknown keys are ignored; `#` and `//`
    /// comment lines are skipped.
    pub fn parse(content: &str) -> Result<Self> {
        let mut map = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            map.insert(
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            );
        }

        let take = |key: &str| -> Result<String> {
            match map.get(key) {
                Some(v) if !v.is_empty() => Ok(v.clone()),
                _ => bail!("missing required variable '{key}'"),
            }
        };

        let vars = Self {
            project: take("project")?,
            region: take("region")?,
            zone: take("zone")?,
            cluster_name: take("cluster_name")?,
            public_ip: take("public_ip")?,
        };

        vars.public_ip
            .parse::<IpAddr>()
            .with_context(|| format!("'public_ip' is not a valid IP address: {}", vars.public_ip))?;

        Ok(vars)
    }
}
