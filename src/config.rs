// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line configuration for the `nodedns` binary.
//!
//! Flag names match the node source flags of the DNS controller this source feeds,
//! so the same arguments can be passed through unchanged.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::constants::DEFAULT_CONTROLLER_ID;
use crate::endpoint::Endpoint;
use crate::source::NodeSourceConfig;
use crate::ttl::parse_go_duration;

/// Output encoding for derived endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    /// Encode endpoints in this format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(self, endpoints: &[Endpoint]) -> Result<String> {
        match self {
            Self::Json => {
                serde_json::to_string_pretty(endpoints).context("Failed to encode endpoints as JSON")
            }
            Self::Yaml => serde_yaml::to_string(endpoints).context("Failed to encode endpoints as YAML"),
        }
    }
}

/// Derive DNS endpoints from Kubernetes nodes and print them.
#[derive(Parser, Debug)]
#[command(name = "nodedns", version, about, long_about = None)]
pub struct Cli {
    /// Filter nodes by annotations using a label selector (e.g. "dns/publish=true")
    #[arg(long, default_value = "")]
    pub annotation_filter: String,

    /// Template for node hostnames (e.g. "{{ .Name }}.nodes.example.org")
    #[arg(long, default_value = "")]
    pub fqdn_template: String,

    /// Filter nodes by labels using a label selector
    #[arg(long, default_value = "")]
    pub label_filter: String,

    /// Controller annotation value of nodes this source is responsible for
    #[arg(long, default_value = DEFAULT_CONTROLLER_ID)]
    pub controller_id: String,

    /// Publish internal IPv6 addresses next to external addresses (default)
    #[arg(long, overrides_with = "no_expose_internal_ipv6")]
    pub expose_internal_ipv6: bool,

    /// Only publish external addresses when a node has any
    #[arg(long, overrides_with = "expose_internal_ipv6")]
    pub no_expose_internal_ipv6: bool,

    /// Skip cordoned nodes (default)
    #[arg(long, overrides_with = "no_exclude_unschedulable")]
    pub exclude_unschedulable: bool,

    /// Publish cordoned nodes too
    #[arg(long, overrides_with = "exclude_unschedulable")]
    pub no_exclude_unschedulable: bool,

    /// How long to wait for the initial node list (Go duration, e.g. "60s", "2m")
    #[arg(long, default_value = "60s", value_parser = parse_timeout)]
    pub cache_sync_timeout: Duration,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    /// Print Prometheus metrics to stderr after deriving endpoints
    #[arg(long)]
    pub print_metrics: bool,
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    parse_go_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Build the source configuration from the parsed flags.
    #[must_use]
    pub fn to_config(&self) -> NodeSourceConfig {
        NodeSourceConfig {
            controller_id: self.controller_id.clone(),
            annotation_filter: self.annotation_filter.clone(),
            fqdn_template: self.fqdn_template.clone(),
            label_selector: self.label_filter.clone(),
            expose_internal_ipv6: !self.no_expose_internal_ipv6,
            exclude_unschedulable: !self.no_exclude_unschedulable,
            cache_sync_timeout: self.cache_sync_timeout,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
