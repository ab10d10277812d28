// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # nodedns - Kubernetes Node Endpoints for DNS Controllers
//!
//! nodedns turns the nodes of a Kubernetes cluster into DNS endpoints that an external
//! DNS synchronization controller can publish.
//!
//! ## Overview
//!
//! For every eligible node the source decides:
//!
//! - **Which DNS name** to publish: the node name, or the first hostname produced by
//!   an FQDN template
//! - **Which targets** to publish: an explicit target annotation, else the node's
//!   external addresses (optionally with internal IPv6), else its internal addresses
//! - **Which record type** each target needs: `A`, `AAAA` or `CNAME`
//!
//! Targets that share a DNS name and record type are merged into a single endpoint.
//!
//! ## Modules
//!
//! - [`source`] - The node source and its configuration
//! - [`gate`] - Ownership, schedulability and annotation-filter checks
//! - [`addresses`] - Target address selection
//! - [`hostname`] - DNS name derivation
//! - [`aggregator`] - Grouping of targets into endpoints
//! - [`endpoint`] - Endpoint data model
//! - [`inventory`] - Reflector-backed node inventory
//! - [`selector`] - Label selector parsing and matching
//! - [`template`] - FQDN templates
//! - [`ttl`] - TTL annotation parsing
//!
//! ## Example
//!
//! ```rust,no_run
//! use kube::runtime::reflector::store;
//! use k8s_openapi::api::core::v1::Node;
//! use nodedns::source::{NodeSource, NodeSourceConfig};
//!
//! # fn example() -> Result<(), nodedns::errors::SourceError> {
//! // Any synced reflector store can serve as the inventory
//! let (reader, _writer) = store::<Node>();
//!
//! let config = NodeSourceConfig {
//!     fqdn_template: "{{ .Name }}.nodes.example.org".to_string(),
//!     expose_internal_ipv6: false,
//!     ..Default::default()
//! };
//! let source = NodeSource::new(reader, &config)?;
//!
//! for endpoint in source.endpoints()? {
//!     println!("{endpoint}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Annotations
//!
//! - `external-dns.alpha.kubernetes.io/controller` - Claims a node for a controller
//! - `external-dns.alpha.kubernetes.io/target` - Overrides the published targets
//! - `external-dns.alpha.kubernetes.io/ttl` - Record TTL in seconds or as a duration

pub mod addresses;
pub mod aggregator;
pub mod annotations;
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod errors;
pub mod gate;
pub mod hostname;
pub mod inventory;
pub mod metrics;
pub mod selector;
pub mod source;
pub mod template;
pub mod ttl;

#[cfg(test)]
mod node_fixtures;
