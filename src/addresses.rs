// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Target address selection for nodes.
//!
//! An explicit target annotation always wins. Otherwise external addresses are
//! preferred over internal ones, mirroring how kubelet picks a preferred node address.
//! When `expose_internal_ipv6` is enabled, internal IPv6 addresses are published
//! alongside the external ones; this default is deprecated and logs a warning.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::annotations::TARGET_ANNOTATION;
use crate::constants::{
    INTERNAL_IPV6_DEPRECATION_WARNING, NODE_ADDRESS_EXTERNAL_IP, NODE_ADDRESS_INTERNAL_IP,
};
use crate::endpoint::RecordType;
use crate::errors::SourceError;

/// Parse the target annotation into a list of targets.
///
/// All spaces are removed, the value is split on `,`, and one trailing `.` is stripped
/// from each entry. Empty entries are dropped. Returns an empty list when the
/// annotation is absent.
///
/// # Example
///
/// ```
/// use nodedns::addresses::targets_from_annotations;
/// use std::collections::BTreeMap;
///
/// let annotations = BTreeMap::from([(
///     "external-dns.alpha.kubernetes.io/target".to_string(),
///     "203.0.113.5, lb.example.org.".to_string(),
/// )]);
/// assert_eq!(
///     targets_from_annotations(&annotations),
///     vec!["203.0.113.5", "lb.example.org"]
/// );
/// ```
#[must_use]
pub fn targets_from_annotations(annotations: &BTreeMap<String, String>) -> Vec<String> {
    let Some(raw) = annotations.get(TARGET_ANNOTATION) else {
        return Vec::new();
    };

    raw.replace(' ', "")
        .split(',')
        .map(|target| target.strip_suffix('.').unwrap_or(target))
        .filter(|target| !target.is_empty())
        .map(str::to_string)
        .collect()
}

/// Selects the target addresses published for a node.
#[derive(Debug)]
pub struct AddressResolver {
    expose_internal_ipv6: bool,
    warned: AtomicBool,
}

impl AddressResolver {
    #[must_use]
    pub fn new(expose_internal_ipv6: bool) -> Self {
        Self {
            expose_internal_ipv6,
            warned: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn expose_internal_ipv6(&self) -> bool {
        self.expose_internal_ipv6
    }

    /// Resolve the targets for a node.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::AddressNotFound`] if the node has no target annotation
    /// and reports neither external nor internal addresses.
    pub fn resolve(&self, node: &Node) -> Result<Vec<String>, SourceError> {
        let targets = targets_from_annotations(node.annotations());
        if !targets.is_empty() {
            debug!(node = %node.name_any(), targets = ?targets, "Using targets from annotation");
            return Ok(targets);
        }

        self.node_addresses(node)
    }

    /// Select addresses from the node's reported status.
    ///
    /// Order within each bucket follows the order reported by the node. External
    /// addresses always precede appended internal IPv6 addresses.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::AddressNotFound`] if no external or internal address
    /// is reported.
    pub fn node_addresses(&self, node: &Node) -> Result<Vec<String>, SourceError> {
        let mut external = Vec::new();
        let mut internal = Vec::new();
        let mut internal_ipv6 = Vec::new();

        let reported = node
            .status
            .as_ref()
            .and_then(|status| status.addresses.as_deref())
            .unwrap_or_default();

        for address in reported {
            match address.type_.as_str() {
                NODE_ADDRESS_EXTERNAL_IP => external.push(address.address.clone()),
                NODE_ADDRESS_INTERNAL_IP => {
                    if RecordType::for_target(&address.address) == RecordType::AAAA {
                        internal_ipv6.push(address.address.clone());
                    }
                    internal.push(address.address.clone());
                }
                _ => {}
            }
        }

        if !external.is_empty() {
            if self.expose_internal_ipv6 {
                self.warn_once();
                external.extend(internal_ipv6);
            }
            return Ok(external);
        }

        if !internal.is_empty() {
            return Ok(internal);
        }

        Err(SourceError::AddressNotFound {
            node: node.name_any(),
        })
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!("{INTERNAL_IPV6_DEPRECATION_WARNING}");
        }
    }

    #[cfg(test)]
    pub(crate) fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "addresses_tests.rs"]
mod addresses_tests;
