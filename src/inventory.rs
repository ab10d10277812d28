// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node inventory backed by a reflector store.
//!
//! Derivation never talks to the API server. Nodes are read from an in-memory
//! [`Store`] that a background reflector task keeps current. The store must finish its
//! initial list before the first derivation, see [`wait_for_cache_sync`].

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::SourceError;
use crate::selector::Selector;

/// Read access to the current set of nodes.
pub trait NodeInventory: Send + Sync {
    /// All cached nodes whose labels match `selector`.
    fn list(&self, selector: &Selector) -> Vec<Arc<Node>>;
}

impl NodeInventory for Store<Node> {
    fn list(&self, selector: &Selector) -> Vec<Arc<Node>> {
        self.state()
            .into_iter()
            .filter(|node| selector.matches(node.labels()))
            .collect()
    }
}

/// A node store together with the reflector task that feeds it.
///
/// Dropping the cache stops the reflector.
pub struct NodeCache {
    store: Store<Node>,
    task: JoinHandle<()>,
}

impl NodeCache {
    /// Start watching nodes and mirroring them into a store.
    ///
    /// A non-empty `label_selector` is also sent to the API server so that only
    /// matching nodes are transferred. Watch errors are logged and retried with
    /// backoff.
    #[must_use]
    pub fn start(client: Client, label_selector: &Selector) -> Self {
        let api: Api<Node> = Api::all(client);

        let mut config = watcher::Config::default();
        if !label_selector.is_empty() {
            config = config.labels(&label_selector.to_string());
        }

        let (store, writer) = reflector::store();
        let stream = watcher(api, config).default_backoff().reflect(writer);

        info!(selector = %label_selector, "Starting node reflector");
        let task = tokio::spawn(async move {
            stream
                .for_each(|event| async move {
                    match event {
                        Ok(watcher::Event::Apply(node)) => {
                            debug!(node = %node.name_any(), "Node updated");
                        }
                        Ok(watcher::Event::Delete(node)) => {
                            debug!(node = %node.name_any(), "Node deleted");
                        }
                        Ok(watcher::Event::InitDone) => debug!("Node cache initial sync complete"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Node watch error"),
                    }
                })
                .await;
        });

        Self { store, task }
    }

    /// The store this cache keeps up to date.
    #[must_use]
    pub fn store(&self) -> &Store<Node> {
        &self.store
    }
}

impl NodeInventory for NodeCache {
    fn list(&self, selector: &Selector) -> Vec<Arc<Node>> {
        self.store.list(selector)
    }
}

impl Drop for NodeCache {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Wait until `store` has completed its initial list.
///
/// # Errors
///
/// - [`SourceError::CacheSyncTimeout`] if `timeout` elapses first
/// - [`SourceError::CacheSyncCancelled`] if `shutdown` completes first
/// - [`SourceError::CacheWriterDropped`] if the feeding reflector went away
pub async fn wait_for_cache_sync<F>(
    store: &Store<Node>,
    timeout: Duration,
    shutdown: F,
) -> Result<(), SourceError>
where
    F: Future<Output = ()>,
{
    debug!(timeout_secs = timeout.as_secs(), "Waiting for node cache to sync");

    tokio::select! {
        result = tokio::time::timeout(timeout, store.wait_until_ready()) => match result {
            Ok(Ok(())) => {
                info!(nodes = store.state().len(), "Node cache synced");
                Ok(())
            }
            Ok(Err(_)) => Err(SourceError::CacheWriterDropped),
            Err(_) => Err(SourceError::CacheSyncTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        },
        () = shutdown => Err(SourceError::CacheSyncCancelled),
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod inventory_tests;
