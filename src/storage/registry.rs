// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The registry store: one JSON document, one write lock, one
//! load-patch-save transaction per logical operation.
//!
//! Readers take no lock; the save path writes to a temp file and renames it
//! over the document, so any read observes either the previous or the next
//! complete state, never a torn one. A truncated or hand-mangled document
//! surfaces as an error instead of being silently replaced with an empty
//! registry, because the next save would make that loss permanent.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::{
    expiry_start_utc, Node, NodePatch, RegistryState, Subscription, SubscriptionPatch,
};
use crate::traffic::{self, TrafficSource};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("registry document error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("node not found")]
    NodeNotFound,
    #[error("subscription not found")]
    SubscriptionNotFound,
}

/// Addresses a node either by its position in the list (the dashboard works
/// positionally) or by its stable id.
#[derive(Debug, Clone)]
pub enum NodeSelector {
    Index(usize),
    Id(String),
}

impl NodeSelector {
    fn resolve(&self, nodes: &[Node]) -> Option<usize> {
        match self {
            NodeSelector::Index(index) if *index < nodes.len() => Some(*index),
            NodeSelector::Index(_) => None,
            NodeSelector::Id(id) => nodes.iter().position(|n| &n.id == id),
        }
    }
}

/// Single source of truth for nodes and subscriptions.
#[derive(Debug)]
pub struct RegistryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Builds from [`crate::config::CONFIG_PATH_ENV`].
    pub fn from_env() -> Self {
        let path = std::env::var(crate::config::CONFIG_PATH_ENV)
            .unwrap_or_else(|_| crate::config::DEFAULT_CONFIG_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the current document. A missing file is an empty registry; a
    /// legacy flat list of URLs is migrated on the fly.
    pub fn load(&self) -> Result<RegistryState, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RegistryState::default()),
            Err(e) => return Err(e.into()),
        };
        parse_document(&bytes)
    }

    fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to temp file first, then rename for atomicity.
        let temp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, state)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// The transaction boundary: takes the write lock, loads, applies,
    /// saves. Everything a logical operation reads and writes happens
    /// inside the one closure.
    pub async fn mutate<T, F>(&self, apply: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut RegistryState) -> Result<T, StoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load()?;
        let out = apply(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }

    pub async fn add_node(&self, node: Node) -> Result<Node, StoreError> {
        self.mutate(move |state| {
            state.nodes.push(node.clone());
            Ok(node)
        })
        .await
    }

    pub async fn update_node(
        &self,
        selector: NodeSelector,
        patch: NodePatch,
    ) -> Result<Node, StoreError> {
        self.mutate(move |state| {
            let index = selector.resolve(&state.nodes).ok_or(StoreError::NodeNotFound)?;
            state.nodes[index].apply(patch);
            Ok(state.nodes[index].clone())
        })
        .await
    }

    pub async fn remove_node(&self, selector: NodeSelector) -> Result<Node, StoreError> {
        self.mutate(move |state| {
            let index = selector.resolve(&state.nodes).ok_or(StoreError::NodeNotFound)?;
            Ok(state.nodes.remove(index))
        })
        .await
    }

    /// Inserts a subscription, snapshotting its traffic baselines against
    /// freshly refreshed counters inside the same critical section. The
    /// refreshed node counters are persisted along with it.
    pub async fn add_subscription_with_baseline(
        &self,
        mut sub: Subscription,
        source: &dyn TrafficSource,
    ) -> Result<Subscription, StoreError> {
        self.mutate(move |state| {
            traffic::refresh(&mut state.nodes, source);
            let RegistryState { nodes, subscriptions } = state;
            traffic::reset_baseline(&mut sub, nodes);
            subscriptions.push(sub.clone());
            Ok(sub)
        })
        .await
    }

    pub async fn update_subscription(
        &self,
        id: &str,
        patch: SubscriptionPatch,
    ) -> Result<Subscription, StoreError> {
        self.mutate(move |state| {
            let sub = state
                .subscriptions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(StoreError::SubscriptionNotFound)?;
            sub.apply(patch);
            Ok(sub.clone())
        })
        .await
    }

    pub async fn remove_subscription(&self, id: &str) -> Result<Subscription, StoreError> {
        self.mutate(move |state| {
            let index = state
                .subscriptions
                .iter()
                .position(|s| s.id == id)
                .ok_or(StoreError::SubscriptionNotFound)?;
            Ok(state.subscriptions.remove(index))
        })
        .await
    }

    /// Rebases a subscription's traffic baselines on freshly refreshed
    /// counters; refresh and rebase share the critical section so the
    /// baseline can never be taken against counters older than the ones
    /// persisted with it.
    pub async fn reset_subscription_baseline(
        &self,
        id: &str,
        source: &dyn TrafficSource,
    ) -> Result<Subscription, StoreError> {
        self.mutate(move |state| {
            traffic::refresh(&mut state.nodes, source);
            let RegistryState { nodes, subscriptions } = state;
            let sub = subscriptions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(StoreError::SubscriptionNotFound)?;
            traffic::reset_baseline(sub, nodes);
            Ok(sub.clone())
        })
        .await
    }

    /// Pushes the expiry out by `hours` from whichever is later, the current
    /// expiry or now. Extending a long-expired subscription therefore grants
    /// time from today instead of producing a date still in the past.
    pub async fn extend_subscription_expiry(
        &self,
        id: &str,
        hours: f64,
        now: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        self.mutate(move |state| {
            let sub = state
                .subscriptions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(StoreError::SubscriptionNotFound)?;
            let current = sub.expiry.map(expiry_start_utc).unwrap_or(now);
            let base = current.max(now);
            let extended = base + Duration::seconds((hours * 3600.0) as i64);
            sub.expiry = Some(extended.date_naive());
            Ok(sub.clone())
        })
        .await
    }
}

fn parse_document(bytes: &[u8]) -> Result<RegistryState, StoreError> {
    let value: Value = serde_json::from_slice(bytes)?;

    // v1 stored a bare JSON array of endpoint URLs.
    if let Value::Array(urls) = value {
        info!(count = urls.len(), "migrating legacy url-list registry document");
        let nodes = urls
            .iter()
            .enumerate()
            .filter_map(|(i, u)| {
                u.as_str().map(|url| Node {
                    id: i.to_string(),
                    name: format!("Node {}", i + 1),
                    url: url.to_string(),
                    limit_gb: 0.0,
                    used_bytes: 0,
                    expiry: None,
                    chain_with: None,
                })
            })
            .collect();
        return Ok(RegistryState {
            nodes,
            subscriptions: Vec::new(),
        });
    }

    Ok(serde_json::from_value(value)?)
}
