// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Well-known node annotations understood by the node source.
//!
//! These keys are shared with the DNS synchronization controller so operators can
//! steer how a node is published without changing the controller configuration.

// ============================================================================
// DNS Annotations
// https://kubernetes-sigs.github.io/external-dns/latest/docs/annotations/annotations/
// ============================================================================

/// Annotation naming the controller responsible for a node's DNS records
pub const CONTROLLER_ANNOTATION: &str = "external-dns.alpha.kubernetes.io/controller";

/// Annotation overriding the published targets (comma-separated)
pub const TARGET_ANNOTATION: &str = "external-dns.alpha.kubernetes.io/target";

/// Annotation setting the record TTL (seconds, or a duration such as `1m30s`)
pub const TTL_ANNOTATION: &str = "external-dns.alpha.kubernetes.io/ttl";
