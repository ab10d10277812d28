// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the node source against a live cluster.
//!
//! Run with: cargo test --test node_source_integration -- --ignored

mod common;

use common::{get_kube_client_or_skip, list_nodes, test_config};
use kube::ResourceExt;
use nodedns::errors::SourceError;
use nodedns::source::{NodeSource, NodeSourceConfig};
use std::collections::BTreeSet;
use std::future::pending;

#[tokio::test]
#[ignore] // Run with: cargo test --test node_source_integration -- --ignored
async fn test_source_syncs_and_derives_endpoints() {
    println!("\n=== Test: Derive Endpoints From Cluster Nodes ===\n");

    let client = match get_kube_client_or_skip().await {
        Some(c) => c,
        None => return,
    };

    let source = NodeSource::from_client(client.clone(), &test_config(), pending())
        .await
        .expect("node cache should sync");
    let endpoints = source.endpoints().expect("derivation should succeed");

    println!("✓ Derived {} endpoints", endpoints.len());
    for endpoint in &endpoints {
        println!("  - {endpoint}");
        assert!(
            !endpoint.targets.is_empty(),
            "every endpoint should carry at least one target"
        );
    }

    let keys: BTreeSet<_> = endpoints.iter().map(|e| e.key()).collect();
    assert_eq!(keys.len(), endpoints.len(), "endpoint keys must be unique");

    // Without a template every endpoint is named after a node
    let node_names: BTreeSet<String> = list_nodes(&client)
        .await
        .expect("nodes should be listable")
        .iter()
        .map(ResourceExt::name_any)
        .collect();
    for endpoint in &endpoints {
        assert!(
            node_names.contains(&endpoint.dns_name),
            "unexpected endpoint name {}",
            endpoint.dns_name
        );
    }

    println!("\n✓ Test passed\n");
}

#[tokio::test]
#[ignore]
async fn test_endpoints_are_stable_between_calls() {
    println!("\n=== Test: Repeated Derivation ===\n");

    let client = match get_kube_client_or_skip().await {
        Some(c) => c,
        None => return,
    };

    let source = NodeSource::from_client(client, &test_config(), pending())
        .await
        .expect("node cache should sync");

    let first: BTreeSet<_> = source.endpoints().unwrap().iter().map(|e| e.key()).collect();
    let second: BTreeSet<_> = source.endpoints().unwrap().iter().map(|e| e.key()).collect();
    assert_eq!(first, second);

    println!("\n✓ Test passed\n");
}

#[tokio::test]
#[ignore]
async fn test_templated_hostnames() {
    println!("\n=== Test: FQDN Template ===\n");

    let client = match get_kube_client_or_skip().await {
        Some(c) => c,
        None => return,
    };

    let config = NodeSourceConfig {
        fqdn_template: "{{ .Name }}.nodes.integration.test".to_string(),
        ..test_config()
    };
    let source = NodeSource::from_client(client, &config, pending())
        .await
        .expect("node cache should sync");

    for endpoint in source.endpoints().unwrap() {
        assert!(endpoint.dns_name.ends_with(".nodes.integration.test"));
    }

    println!("\n✓ Test passed\n");
}

#[tokio::test]
#[ignore]
async fn test_unmatched_label_selector_yields_nothing() {
    println!("\n=== Test: Label Selector Matching No Nodes ===\n");

    let client = match get_kube_client_or_skip().await {
        Some(c) => c,
        None => return,
    };

    let config = NodeSourceConfig {
        label_selector: "nodedns.integration.test/never-set=true".to_string(),
        ..test_config()
    };
    let source = NodeSource::from_client(client, &config, pending())
        .await
        .expect("node cache should sync");

    assert!(source.endpoints().unwrap().is_empty());

    println!("\n✓ Test passed\n");
}

#[tokio::test]
#[ignore]
async fn test_invalid_configuration_fails_before_sync() {
    let client = match get_kube_client_or_skip().await {
        Some(c) => c,
        None => return,
    };

    let config = NodeSourceConfig {
        fqdn_template: "{{ .Name".to_string(),
        ..test_config()
    };

    match NodeSource::from_client(client, &config, pending()).await {
        Err(SourceError::InvalidTemplate { .. }) => println!("✓ Invalid template rejected"),
        Err(e) => panic!("expected InvalidTemplate, got {e}"),
        Ok(_) => panic!("expected InvalidTemplate, got a running source"),
    }
}

#[tokio::test]
#[ignore]
async fn test_sync_is_cancellable() {
    let client = match get_kube_client_or_skip().await {
        Some(c) => c,
        None => return,
    };

    match NodeSource::from_client(client, &test_config(), async {}).await {
        // A very fast API server can finish the initial list before the shutdown
        // future is polled
        Err(SourceError::CacheSyncCancelled) | Ok(_) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }
}
