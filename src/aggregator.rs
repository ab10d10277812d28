// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Grouping of derived targets into endpoints.

use std::collections::HashMap;
use tracing::debug;

use crate::endpoint::{Endpoint, EndpointKey, RecordType};

/// Accumulates targets under their (DNS name, record type) key.
///
/// The first target added for a key fixes the endpoint's TTL; TTLs supplied with
/// later targets for the same key are ignored. An aggregator lives for a single
/// derivation pass.
#[derive(Debug, Default)]
pub struct EndpointAggregator {
    endpoints: HashMap<EndpointKey, Endpoint>,
}

impl EndpointAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target for `dns_name`. The record type is derived from the target.
    pub fn add(&mut self, dns_name: &str, target: &str, ttl: Option<i32>) {
        let key = EndpointKey {
            dns_name: dns_name.to_string(),
            record_type: RecordType::for_target(target),
        };

        debug!(dns_name, target, record_type = %key.record_type, "Adding endpoint target");

        self.endpoints
            .entry(key)
            .or_insert_with_key(|key| Endpoint::new(key.dns_name.clone(), key.record_type, ttl))
            .targets
            .push(target);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Consume the aggregator, returning one endpoint per key sorted by key.
    #[must_use]
    pub fn flatten(self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self.endpoints.into_values().collect();
        endpoints.sort_by(|a, b| {
            a.dns_name
                .cmp(&b.dns_name)
                .then(a.record_type.cmp(&b.record_type))
        });
        endpoints
    }
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod aggregator_tests;
