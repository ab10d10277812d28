// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for nodedns.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Controller Ownership Constants
// ============================================================================

/// Controller identifier expected in the controller annotation when present.
///
/// Nodes annotated with a different controller are owned by someone else and skipped.
pub const DEFAULT_CONTROLLER_ID: &str = "dns-controller";

// ============================================================================
// Node Address Constants
// ============================================================================

/// `NodeAddress` type for publicly routable addresses
pub const NODE_ADDRESS_EXTERNAL_IP: &str = "ExternalIP";

/// `NodeAddress` type for cluster-internal addresses
pub const NODE_ADDRESS_INTERNAL_IP: &str = "InternalIP";

/// Logged once per resolver when internal IPv6 addresses are published next to external ones
pub const INTERNAL_IPV6_DEPRECATION_WARNING: &str = "The default behavior of exposing internal IPv6 addresses will change in the next minor version. Use --no-expose-internal-ipv6 flag to opt-in to the new behavior.";

// ============================================================================
// TTL Constants
// ============================================================================

/// Smallest TTL accepted from the TTL annotation
pub const TTL_MIN_SECS: i64 = 1;

/// Largest TTL accepted from the TTL annotation
pub const TTL_MAX_SECS: i64 = i32::MAX as i64;

// ============================================================================
// Template Constants
// ============================================================================

/// Separator between hostnames produced by a single template execution
pub const TEMPLATE_HOSTNAME_SEPARATOR: char = ',';

/// Rendered in place of a missing map entry, matching Go `text/template`
pub const TEMPLATE_NO_VALUE: &str = "<no value>";

// ============================================================================
// Label Selector Constants
// ============================================================================

/// Maximum length of a label name or value
pub const LABEL_NAME_MAX_LEN: usize = 63;

/// Maximum length of a label key prefix (DNS subdomain)
pub const LABEL_PREFIX_MAX_LEN: usize = 253;

// ============================================================================
// Inventory Cache Constants
// ============================================================================

/// How long to wait for the node cache to complete its initial sync
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

/// Resource kind prefix used when logging about nodes (e.g. `node/worker-1`)
pub const NODE_RESOURCE_PREFIX: &str = "node";
