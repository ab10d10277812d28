// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-node eligibility checks.
//!
//! A node is published only if:
//! 1. its annotations match the configured annotation filter,
//! 2. it is not claimed by a different controller (via the controller annotation),
//! 3. it is schedulable, unless unschedulable nodes are explicitly included.
//!
//! Ineligible nodes are skipped, never treated as errors.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::annotations::CONTROLLER_ANNOTATION;
use crate::errors::SourceError;
use crate::selector::{self, Selector};

/// Why a node was not admitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The controller annotation names a different controller
    ControllerMismatch {
        /// Value found on the node
        found: String,
    },
    /// The node is cordoned and unschedulable nodes are excluded
    Unschedulable,
    /// The node's annotations do not match the annotation filter
    AnnotationFilter,
}

impl RejectReason {
    /// Stable name used for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControllerMismatch { .. } => "controller_mismatch",
            Self::Unschedulable => "unschedulable",
            Self::AnnotationFilter => "annotation_filter",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControllerMismatch { found } => {
                write!(f, "controller value does not match, found: {found}")
            }
            Self::Unschedulable => f.write_str("node is unschedulable"),
            Self::AnnotationFilter => f.write_str("annotations do not match the filter"),
        }
    }
}

/// Outcome of [`AnnotationGate::admit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject(RejectReason),
}

impl Admission {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Decides which nodes this source is responsible for.
#[derive(Clone, Debug)]
pub struct AnnotationGate {
    controller_id: String,
    annotation_filter: Selector,
    exclude_unschedulable: bool,
}

impl AnnotationGate {
    /// Build a gate, compiling the annotation filter expression.
    ///
    /// An empty or whitespace-only filter admits every node.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidSelector`] if the annotation filter is malformed.
    pub fn new(
        controller_id: impl Into<String>,
        annotation_filter: &str,
        exclude_unschedulable: bool,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            controller_id: controller_id.into(),
            annotation_filter: selector::parse(annotation_filter)?,
            exclude_unschedulable,
        })
    }

    #[must_use]
    pub fn controller_id(&self) -> &str {
        &self.controller_id
    }

    #[must_use]
    pub fn annotation_filter(&self) -> &Selector {
        &self.annotation_filter
    }

    /// Check ownership and schedulability of a single node.
    ///
    /// A missing controller annotation means the node is unclaimed and is admitted.
    #[must_use]
    pub fn admit(&self, node: &Node) -> Admission {
        let admission = self.check(node);
        if let Admission::Reject(reason) = &admission {
            debug!(node = %node.name_any(), reason = %reason, "Skipping node");
        }
        admission
    }

    fn check(&self, node: &Node) -> Admission {
        if let Some(found) = node.annotations().get(CONTROLLER_ANNOTATION) {
            if *found != self.controller_id {
                return Admission::Reject(RejectReason::ControllerMismatch {
                    found: found.clone(),
                });
            }
        }

        let unschedulable = node
            .spec
            .as_ref()
            .and_then(|spec| spec.unschedulable)
            .unwrap_or(false);
        if unschedulable && self.exclude_unschedulable {
            return Admission::Reject(RejectReason::Unschedulable);
        }

        Admission::Admit
    }

    /// Whether a node's annotations satisfy the annotation filter.
    #[must_use]
    pub fn matches_filter(&self, node: &Node) -> bool {
        self.annotation_filter.is_empty() || self.annotation_filter.matches(node.annotations())
    }

    /// Keep only the nodes whose annotations satisfy the annotation filter.
    #[must_use]
    pub fn filter(&self, nodes: Vec<Arc<Node>>) -> Vec<Arc<Node>> {
        if self.annotation_filter.is_empty() {
            return nodes;
        }

        nodes
            .into_iter()
            .filter(|node| {
                let matched = self.annotation_filter.matches(node.annotations());
                if !matched {
                    debug!(
                        node = %node.name_any(),
                        filter = %self.annotation_filter,
                        "Skipping node: {}",
                        RejectReason::AnnotationFilter
                    );
                }
                matched
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod gate_tests;
