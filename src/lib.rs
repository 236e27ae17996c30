// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sub Hub - Managed Proxy Registry & Clash Subscription Service
//!
//! This crate maintains a registry of proxy endpoints, meters their traffic
//! against per-subscription quotas, and synthesizes Clash YAML documents on
//! demand for token-addressed subscription URLs.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `gate` - Per-token admission checks (expiry, quota)
//! - `clash` - Clash document model, chain resolution, synthesis
//! - `traffic` - Delta accounting over the 3x-ui counter database
//! - `storage` - The persistent registry document

pub mod api;
pub mod clash;
pub mod config;
pub mod error;
pub mod gate;
pub mod links;
pub mod models;
pub mod state;
pub mod storage;
pub mod traffic;
pub mod upstream;
