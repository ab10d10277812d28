// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::client::Client;
use nodedns::source::NodeSourceConfig;
use std::time::Duration;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// List nodes straight from the API server, bypassing any cache
pub async fn list_nodes(client: &Client) -> Result<Vec<Node>, kube::Error> {
    let nodes: Api<Node> = Api::all(client.clone());
    Ok(nodes.list(&ListParams::default()).await?.items)
}

/// Source configuration with a short sync timeout suitable for tests
pub fn test_config() -> NodeSourceConfig {
    NodeSourceConfig {
        cache_sync_timeout: Duration::from_secs(30),
        ..Default::default()
    }
}
