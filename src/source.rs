// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The node endpoint source.
//!
//! [`NodeSource`] turns the current node inventory into DNS endpoints in a single
//! synchronous pass:
//!
//! 1. List nodes matching the label selector
//! 2. Drop nodes whose annotations fail the annotation filter
//! 3. Skip nodes owned by another controller, and cordoned nodes if configured
//! 4. Resolve each node's DNS name, TTL and target addresses
//! 5. Group targets by (DNS name, record type)
//!
//! A node whose hostname or addresses cannot be resolved fails the whole pass.
//!
//! # Example
//!
//! ```rust,no_run
//! use nodedns::source::{NodeSource, NodeSourceConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = kube::Client::try_default().await?;
//! let config = NodeSourceConfig {
//!     fqdn_template: "{{ .Name }}.nodes.example.org".to_string(),
//!     ..Default::default()
//! };
//!
//! let source = NodeSource::from_client(client, &config, std::future::pending()).await?;
//! for endpoint in source.endpoints()? {
//!     println!("{endpoint}");
//! }
//! # Ok(())
//! # }
//! ```

use k8s_openapi::api::core::v1::Node;
use kube::{Client, ResourceExt};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::addresses::AddressResolver;
use crate::aggregator::EndpointAggregator;
use crate::constants::{DEFAULT_CACHE_SYNC_TIMEOUT_SECS, DEFAULT_CONTROLLER_ID, NODE_RESOURCE_PREFIX};
use crate::endpoint::Endpoint;
use crate::errors::SourceError;
use crate::gate::{Admission, AnnotationGate, RejectReason};
use crate::hostname::HostnameResolver;
use crate::inventory::{wait_for_cache_sync, NodeCache, NodeInventory};
use crate::metrics;
use crate::selector::{self, Selector};
use crate::ttl::ttl_from_annotations;

/// Operator-supplied settings for a [`NodeSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSourceConfig {
    /// Value the controller annotation must have for a claimed node to be published
    pub controller_id: String,

    /// Label-selector expression evaluated against node annotations
    pub annotation_filter: String,

    /// FQDN template; empty means "use the node name"
    pub fqdn_template: String,

    /// Label-selector expression evaluated against node labels
    pub label_selector: String,

    /// Publish internal IPv6 addresses next to external addresses
    pub expose_internal_ipv6: bool,

    /// Skip nodes with `spec.unschedulable` set
    pub exclude_unschedulable: bool,

    /// How long [`NodeSource::from_client`] waits for the initial node list
    pub cache_sync_timeout: Duration,
}

impl Default for NodeSourceConfig {
    fn default() -> Self {
        Self {
            controller_id: DEFAULT_CONTROLLER_ID.to_string(),
            annotation_filter: String::new(),
            fqdn_template: String::new(),
            label_selector: String::new(),
            expose_internal_ipv6: true,
            exclude_unschedulable: true,
            cache_sync_timeout: Duration::from_secs(DEFAULT_CACHE_SYNC_TIMEOUT_SECS),
        }
    }
}

// Compiled form of the configuration, built before any node is read
struct Policy {
    label_selector: Selector,
    gate: AnnotationGate,
    hostnames: HostnameResolver,
    addresses: AddressResolver,
}

impl Policy {
    fn from_config(config: &NodeSourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            label_selector: selector::parse(&config.label_selector)?,
            gate: AnnotationGate::new(
                config.controller_id.clone(),
                &config.annotation_filter,
                config.exclude_unschedulable,
            )?,
            hostnames: HostnameResolver::from_template(&config.fqdn_template)?,
            addresses: AddressResolver::new(config.expose_internal_ipv6),
        })
    }
}

/// Derives DNS endpoints from cluster nodes.
pub struct NodeSource<I> {
    inventory: I,
    policy: Policy,
}

impl<I: NodeInventory> NodeSource<I> {
    /// Build a source over an already-synced inventory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the label selector, annotation filter or
    /// FQDN template does not parse.
    pub fn new(inventory: I, config: &NodeSourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            inventory,
            policy: Policy::from_config(config)?,
        })
    }

    #[must_use]
    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    /// Compute the endpoints for the current node snapshot.
    ///
    /// Output order is by DNS name, then record type. Calling this repeatedly against an
    /// unchanged inventory returns the same endpoints.
    ///
    /// # Errors
    ///
    /// - [`SourceError::TemplateExecution`] if the FQDN template fails on a node
    /// - [`SourceError::NodeAddress`] if a node has no usable address
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let start = Instant::now();

        match self.derive() {
            Ok(endpoints) => {
                metrics::record_derivation_success(start.elapsed(), &endpoints);
                debug!(endpoints = endpoints.len(), "Derived node endpoints");
                Ok(endpoints)
            }
            Err(e) => {
                metrics::record_derivation_error(e.reason(), start.elapsed());
                Err(e)
            }
        }
    }

    fn derive(&self) -> Result<Vec<Endpoint>, SourceError> {
        let listed = self.inventory.list(&self.policy.label_selector);
        let listed_count = listed.len();

        let nodes = self.policy.gate.filter(listed);
        for _ in nodes.len()..listed_count {
            metrics::record_node_skipped(RejectReason::AnnotationFilter.as_str());
        }

        let mut aggregator = EndpointAggregator::new();
        for node in &nodes {
            self.add_node(node, &mut aggregator)?;
        }

        Ok(aggregator.flatten())
    }

    fn add_node(&self, node: &Node, aggregator: &mut EndpointAggregator) -> Result<(), SourceError> {
        if let Admission::Reject(reason) = self.policy.gate.admit(node) {
            metrics::record_node_skipped(reason.as_str());
            return Ok(());
        }

        let name = node.name_any();
        debug!(node = %name, "Creating endpoints for node");

        let ttl = ttl_from_annotations(node.annotations(), &format!("{NODE_RESOURCE_PREFIX}/{name}"));
        let dns_name = self.policy.hostnames.resolve(node)?;
        let targets = self
            .policy
            .addresses
            .resolve(node)
            .map_err(|e| SourceError::NodeAddress {
                node: name.clone(),
                source: Box::new(e),
            })?;

        for target in &targets {
            aggregator.add(&dns_name, target, ttl);
        }

        Ok(())
    }
}

impl NodeSource<NodeCache> {
    /// Start a node reflector, wait for its initial sync, and build a source over it.
    ///
    /// The configuration is validated before anything is requested from the API
    /// server. The wait is bounded by `config.cache_sync_timeout` and abandoned as soon
    /// as `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, [`SourceError::CacheSyncTimeout`],
    /// [`SourceError::CacheSyncCancelled`] or [`SourceError::CacheWriterDropped`].
    pub async fn from_client<F>(
        client: Client,
        config: &NodeSourceConfig,
        shutdown: F,
    ) -> Result<Self, SourceError>
    where
        F: Future<Output = ()>,
    {
        let policy = Policy::from_config(config)?;

        let cache = NodeCache::start(client, &policy.label_selector);
        wait_for_cache_sync(cache.store(), config.cache_sync_timeout, shutdown).await?;

        info!(
            controller_id = %policy.gate.controller_id(),
            expose_internal_ipv6 = policy.addresses.expose_internal_ipv6(),
            "Node source ready"
        );

        Ok(Self {
            inventory: cache,
            policy,
        })
    }
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod source_tests;
