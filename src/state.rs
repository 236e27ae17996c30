// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::clash::TemplateStore;
use crate::storage::RegistryStore;
use crate::traffic::TrafficSource;
use crate::upstream::NodeFetcher;

/// Shared handler state. The store carries its own write lock, so the state
/// itself clones freely into every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RegistryStore>,
    pub traffic: Arc<dyn TrafficSource>,
    pub fetcher: NodeFetcher,
    pub templates: TemplateStore,
    /// Port advertised in guest-pass links.
    pub port: u16,
}

impl AppState {
    pub fn new(
        store: RegistryStore,
        traffic: Arc<dyn TrafficSource>,
        fetcher: NodeFetcher,
        templates: TemplateStore,
        port: u16,
    ) -> Self {
        Self {
            store: Arc::new(store),
            traffic,
            fetcher,
            templates,
            port,
        }
    }
}
