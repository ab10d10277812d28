// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS endpoint data model.
//!
//! An [`Endpoint`] is one DNS name, one record type, and the set of targets published
//! for them. Endpoints are grouped by [`EndpointKey`] so that every target destined for
//! the same name and type lands on a single endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

/// DNS record types produced by the node source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    AAAA,
    /// Canonical name record, used for any target that is not an IP literal
    CNAME,
}

impl RecordType {
    /// Derive the record type from the syntactic shape of a target.
    ///
    /// IPv4 literals map to `A`, IPv6 literals (including IPv4-mapped and zoned
    /// addresses) map to `AAAA`, and anything else is treated as a hostname (`CNAME`).
    ///
    /// # Example
    ///
    /// ```
    /// use nodedns::endpoint::RecordType;
    ///
    /// assert_eq!(RecordType::for_target("192.0.2.1"), RecordType::A);
    /// assert_eq!(RecordType::for_target("2001:db8::1"), RecordType::AAAA);
    /// assert_eq!(RecordType::for_target("lb.example.com"), RecordType::CNAME);
    /// ```
    #[must_use]
    pub fn for_target(target: &str) -> Self {
        match target.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => Self::A,
            Ok(IpAddr::V6(_)) => Self::AAAA,
            Err(_) if is_zoned_ipv6(target) => Self::AAAA,
            Err(_) => Self::CNAME,
        }
    }

    /// Get the record type as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
            Self::CNAME => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// `fe80::1%eth0`
fn is_zoned_ipv6(target: &str) -> bool {
    target
        .split_once('%')
        .is_some_and(|(addr, zone)| !zone.is_empty() && addr.parse::<Ipv6Addr>().is_ok())
}

/// Targets of an endpoint.
///
/// Order follows insertion but carries no meaning; use [`Targets::same`] to compare.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Targets(Vec<String>);

impl Targets {
    /// Create an empty target list.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a target.
    pub fn push(&mut self, target: impl Into<String>) {
        self.0.push(target.into());
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the targets.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Returns true if `target` is one of the targets.
    #[must_use]
    pub fn contains(&self, target: &str) -> bool {
        self.0.iter().any(|t| t == target)
    }

    /// Order-insensitive comparison.
    #[must_use]
    pub fn same(&self, other: &Targets) -> bool {
        let mut left: Vec<&str> = self.0.iter().map(String::as_str).collect();
        let mut right: Vec<&str> = other.0.iter().map(String::as_str).collect();
        left.sort_unstable();
        right.sort_unstable();
        left == right
    }
}

impl fmt::Display for Targets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(";"))
    }
}

impl From<Vec<String>> for Targets {
    fn from(targets: Vec<String>) -> Self {
        Self(targets)
    }
}

impl<S: Into<String>> FromIterator<S> for Targets {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a Targets {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Deduplication identity of an endpoint: (DNS name, record type).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    /// Fully qualified DNS name
    pub dns_name: String,
    /// Record type derived from the target
    pub record_type: RecordType,
}

/// A DNS resource-record group: one name, one type, a set of targets, optional TTL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Fully qualified DNS name
    pub dns_name: String,

    /// Record targets (IP addresses or hostnames)
    pub targets: Targets,

    /// Record type shared by all targets
    pub record_type: RecordType,

    /// TTL in seconds; `None` lets the DNS provider apply its default
    #[serde(rename = "recordTTL", default, skip_serializing_if = "Option::is_none")]
    pub record_ttl: Option<i32>,

    /// Opaque metadata owned by the reconciliation engine
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Endpoint {
    /// Create an endpoint with no targets and an empty label set.
    #[must_use]
    pub fn new(dns_name: impl Into<String>, record_type: RecordType, ttl: Option<i32>) -> Self {
        Self {
            dns_name: dns_name.into(),
            targets: Targets::new(),
            record_type,
            record_ttl: ttl,
            labels: BTreeMap::new(),
        }
    }

    /// Add a target and return the endpoint, for building endpoints inline.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target);
        self
    }

    /// The key this endpoint is grouped under.
    #[must_use]
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            dns_name: self.dns_name.clone(),
            record_type: self.record_type,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN {} {}",
            self.dns_name,
            self.record_ttl.unwrap_or_default(),
            self.record_type,
            self.targets
        )
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod endpoint_tests;
