// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Registry Persistence
//!
//! The whole registry lives in one JSON document:
//!
//! ```text
//! config.json
//! {
//!   "nodes":         [ { id, name, url, limit_gb, used_bytes, ... } ],
//!   "subscriptions": [ { id, name, token, node_ids, traffic_base, ... } ]
//! }
//! ```
//!
//! [`registry::RegistryStore`] owns the document and exposes one
//! load-patch-save critical section per logical operation; see its module
//! docs for the atomicity story. Documents written by the v1 deployment
//! (a bare JSON array of URLs) are migrated transparently at load.

pub mod registry;

pub use registry::{NodeSelector, RegistryStore, StoreError};
