// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node fixtures shared by unit tests.

use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeSpec, NodeStatus};
use kube::api::ObjectMeta;

/// Builder for test nodes.
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            node: Node {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    uid: Some(format!("uid-{name}")),
                    resource_version: Some("1".to_string()),
                    ..Default::default()
                },
                spec: Some(NodeSpec::default()),
                status: Some(NodeStatus::default()),
            },
        }
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.node
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.node
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn address(mut self, type_: &str, address: &str) -> Self {
        self.node
            .status
            .get_or_insert_with(Default::default)
            .addresses
            .get_or_insert_with(Vec::new)
            .push(NodeAddress {
                type_: type_.to_string(),
                address: address.to_string(),
            });
        self
    }

    pub fn external_ip(self, address: &str) -> Self {
        self.address("ExternalIP", address)
    }

    pub fn internal_ip(self, address: &str) -> Self {
        self.address("InternalIP", address)
    }

    pub fn unschedulable(mut self, unschedulable: bool) -> Self {
        self.node
            .spec
            .get_or_insert_with(Default::default)
            .unschedulable = Some(unschedulable);
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}
