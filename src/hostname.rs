// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS name derivation for nodes.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::debug;

use crate::errors::SourceError;
use crate::template::FqdnTemplate;

/// Derives the DNS name of a node: the first hostname produced by the FQDN
/// template when one is configured, otherwise the node name.
#[derive(Clone, Debug, Default)]
pub struct HostnameResolver {
    template: Option<FqdnTemplate>,
}

impl HostnameResolver {
    #[must_use]
    pub fn new(template: Option<FqdnTemplate>) -> Self {
        Self { template }
    }

    /// Build a resolver from a template string; an empty string disables templating.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidTemplate`] if the template does not parse.
    pub fn from_template(template: &str) -> Result<Self, SourceError> {
        Ok(Self::new(FqdnTemplate::parse(template)?))
    }

    #[must_use]
    pub fn template(&self) -> Option<&FqdnTemplate> {
        self.template.as_ref()
    }

    /// Resolve the DNS name of a node.
    ///
    /// A template that renders nothing yields an empty name.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::TemplateExecution`] if the template fails on this node.
    pub fn resolve(&self, node: &Node) -> Result<String, SourceError> {
        let name = node.name_any();

        let Some(template) = &self.template else {
            debug!(node = %name, "Not applying template");
            return Ok(name);
        };

        let hostname = template
            .execute(node)?
            .into_iter()
            .next()
            .unwrap_or_default();
        debug!(node = %name, hostname = %hostname, "Applied FQDN template");

        Ok(hostname)
    }
}

#[cfg(test)]
#[path = "hostname_tests.rs"]
mod hostname_tests;
