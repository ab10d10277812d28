// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the node endpoint source.
//!
//! Errors fall into three groups:
//! - Configuration errors (selectors and templates that fail to parse)
//! - Startup errors (the node cache never became ready)
//! - Derivation errors (a node whose hostname or addresses cannot be resolved)
//!
//! Nodes that are merely ineligible (owned by another controller, unschedulable) are
//! not errors; they are skipped and logged.

use thiserror::Error;

/// Errors that can occur while building or running the node source.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// A label selector or annotation filter expression could not be parsed
    ///
    /// Returned at construction time. The source cannot start with an invalid filter.
    #[error("Invalid selector '{expression}': {reason}")]
    InvalidSelector {
        /// The expression as supplied by the operator
        expression: String,
        /// Why the expression was rejected
        reason: String,
    },

    /// The FQDN template could not be parsed
    #[error("Invalid FQDN template '{template}': {reason}")]
    InvalidTemplate {
        /// The template as supplied by the operator
        template: String,
        /// Why the template was rejected
        reason: String,
    },

    /// The FQDN template failed while executing against a node
    ///
    /// This aborts the whole derivation pass.
    #[error("Failed to apply template on Node {node}: {reason}")]
    TemplateExecution {
        /// Name of the node the template was executed against
        node: String,
        /// Execution failure reported by the template engine
        reason: String,
    },

    /// The node reports neither external nor internal addresses
    #[error("could not find node address for {node}")]
    AddressNotFound {
        /// Name of the node without usable addresses
        node: String,
    },

    /// Address resolution failed for a node
    ///
    /// Wraps the underlying failure with the offending node's name.
    #[error("failed to get node address from {node}: {source}")]
    NodeAddress {
        /// Name of the node whose addresses could not be resolved
        node: String,
        /// The underlying resolution error
        #[source]
        source: Box<SourceError>,
    },

    /// The node cache did not finish its initial sync in time
    #[error("Timed out after {timeout_secs}s waiting for the node cache to sync")]
    CacheSyncTimeout {
        /// Timeout that elapsed, in seconds
        timeout_secs: u64,
    },

    /// Shutdown was requested while waiting for the node cache to sync
    #[error("Cancelled while waiting for the node cache to sync")]
    CacheSyncCancelled,

    /// The reflector feeding the node cache went away before the cache became ready
    #[error("Node cache writer was dropped before the cache became ready")]
    CacheWriterDropped,
}

impl SourceError {
    /// Short, stable reason string used for metrics labels.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSelector { .. } => "invalid_selector",
            Self::InvalidTemplate { .. } => "invalid_template",
            Self::TemplateExecution { .. } => "template_execution",
            Self::AddressNotFound { .. } | Self::NodeAddress { .. } => "address_not_found",
            Self::CacheSyncTimeout { .. } => "cache_sync_timeout",
            Self::CacheSyncCancelled => "cache_sync_cancelled",
            Self::CacheWriterDropped => "cache_writer_dropped",
        }
    }

    /// Returns true for errors caused by operator-supplied configuration.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSelector { .. } | Self::InvalidTemplate { .. }
        )
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
