// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Registry Data Models
//!
//! This module defines the persistent records of the proxy registry: managed
//! [`Node`]s, token-addressed [`Subscription`]s, and the [`ChainSpec`] entries
//! describing upstream dialer hops. All types derive `Serialize`,
//! `Deserialize`, and `ToSchema` for JSON persistence and OpenAPI
//! documentation.
//!
//! The registry is stored as one JSON document (see [`RegistryState`]).
//! Documents written by earlier deployments may lack newer fields, so every
//! counter and collection carries a serde default and expiry dates are parsed
//! leniently (an unparseable date is treated as "no expiry", which is also
//! how the access gate interprets it).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

// =============================================================================
// Nodes
// =============================================================================

/// A managed proxy endpoint.
///
/// The `url` is either a direct proxy link (`vless://`, `vmess://`, `ss://`)
/// or an HTTP(S) upstream subscription URL that yields a list of such links.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    /// Display name, used as the Clash proxy name.
    pub name: String,
    /// Proxy link or upstream subscription URL.
    pub url: String,
    /// Advisory traffic quota in GiB; `0` means unlimited.
    #[serde(default)]
    pub limit_gb: f64,
    /// Last observed cumulative counter for this endpoint, in bytes.
    #[serde(default)]
    pub used_bytes: u64,
    /// Calendar expiry date; absent or unparseable means non-expiring.
    #[serde(default, with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    /// Display name of another node to relay through (target dialed first).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_with: Option<String>,
}

/// Partial update for a node; absent fields keep their stored value and an
/// explicit `null` clears the optional ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NodePatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub limit_gb: Option<f64>,
    #[serde(default, with = "lenient_opt_date")]
    pub expiry: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub chain_with: Option<Option<String>>,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// A token-addressed subscription over a subset of the managed nodes.
///
/// Usage is metered as the delta between each referenced node's cumulative
/// counter and the baseline captured in `traffic_base` when the subscription
/// was created or last reset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Subscription {
    /// Unique identifier for this subscription.
    pub id: String,
    /// Display name shown in the admin dashboard.
    pub name: String,
    /// Capability token; knowing it grants access to the rendered document.
    pub token: String,
    /// Ids of the nodes included in this subscription.
    #[serde(default)]
    pub node_ids: Vec<String>,
    /// Per-node counter baselines captured at creation or last reset.
    #[serde(default)]
    pub traffic_base: HashMap<String, u64>,
    /// Traffic quota in GiB; `0` means unlimited.
    #[serde(default)]
    pub limit_gb: f64,
    /// Last derived usage in bytes; refreshed on reads, informational only.
    #[serde(default)]
    pub used_bytes: u64,
    /// Calendar expiry date; access is cut one full day after it passes.
    #[serde(default, with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    /// Free-form lifecycle marker kept for the dashboard; not enforced.
    #[serde(default = "default_status")]
    pub status: String,
    /// Whether this subscription was minted by the guest-pass endpoint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_guest: bool,
    /// Upstream dialer hops, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<ChainSpec>,
    /// Single-hop predecessor of `chains`; normalized at render time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_proxy: Option<ChainSpec>,
    /// Subscription-level dialer selection by node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialer_id: Option<String>,
    /// Subscription-level dialer selection by (substring of) node name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialer_name: Option<String>,
    /// Template file name under the templates directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Partial update for a subscription; absent fields keep their stored value
/// and an explicit `null` clears the optional ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionPatch {
    pub name: Option<String>,
    pub node_ids: Option<Vec<String>>,
    pub limit_gb: Option<f64>,
    #[serde(default, with = "lenient_opt_date")]
    pub expiry: Option<Option<NaiveDate>>,
    pub status: Option<String>,
    pub chains: Option<Vec<ChainSpec>>,
    #[serde(default, deserialize_with = "double_option")]
    pub external_proxy: Option<Option<ChainSpec>>,
    #[serde(default, deserialize_with = "double_option")]
    pub dialer_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub dialer_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub template: Option<Option<String>>,
}

fn default_status() -> String {
    "active".to_string()
}

impl Node {
    /// Applies a partial update in place.
    pub fn apply(&mut self, patch: NodePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(limit_gb) = patch.limit_gb {
            self.limit_gb = limit_gb;
        }
        if let Some(expiry) = patch.expiry {
            self.expiry = expiry;
        }
        if let Some(chain_with) = patch.chain_with {
            self.chain_with = chain_with;
        }
    }
}

impl Subscription {
    /// Applies a partial update in place. Counters and the token are never
    /// patchable; they change only through reset and recreation.
    pub fn apply(&mut self, patch: SubscriptionPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(node_ids) = patch.node_ids {
            self.node_ids = node_ids;
        }
        if let Some(limit_gb) = patch.limit_gb {
            self.limit_gb = limit_gb;
        }
        if let Some(expiry) = patch.expiry {
            self.expiry = expiry;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(chains) = patch.chains {
            self.chains = chains;
        }
        if let Some(external_proxy) = patch.external_proxy {
            self.external_proxy = external_proxy;
        }
        if let Some(dialer_id) = patch.dialer_id {
            self.dialer_id = dialer_id;
        }
        if let Some(dialer_name) = patch.dialer_name {
            self.dialer_name = dialer_name;
        }
        if let Some(template) = patch.template {
            self.template = template;
        }
    }
}

/// UTC midnight of a calendar expiry date; all expiry arithmetic hangs off
/// this instant.
pub fn expiry_start_utc(date: NaiveDate) -> chrono::DateTime<chrono::Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Distinguishes an absent patch field (keep) from an explicit `null`
/// (clear): absent hits the serde default, `null` lands here as `Some(None)`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// Chains
// =============================================================================

/// One upstream dialer hop of a subscription chain.
///
/// Declared outermost first: the first entry is what the client dials, and
/// each entry's `dialer-proxy` points at the next hop inward.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ChainSpec {
    /// Hop server address.
    #[serde(default)]
    pub server: String,
    /// Hop port; entries with port `0` are skipped at render time.
    #[serde(default, deserialize_with = "port_from_int_or_string")]
    pub port: u16,
    /// Hop protocol; anything other than `http` is emitted as `socks5`.
    #[serde(rename = "type", default = "default_chain_type")]
    pub proxy_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Per-hop dialer selection by node id; falls back to the subscription's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialer_id: Option<String>,
    /// Per-hop dialer selection by node-name substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialer_name: Option<String>,
    /// Display name of the synthesized proxy entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_chain_type() -> String {
    "socks5".to_string()
}

/// Accepts both `1080` and `"1080"`; dashboards have sent both over time.
fn port_from_int_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Num(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Num(port) => Ok(port),
        PortRepr::Text(text) => Ok(text.trim().parse().unwrap_or(0)),
    }
}

// =============================================================================
// Registry Document
// =============================================================================

/// The whole persisted registry: one JSON document on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryState {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl RegistryState {
    /// Looks up a node by id.
    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Looks up a subscription by id.
    pub fn subscription_by_id(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    /// Looks up a subscription by its capability token.
    pub fn subscription_by_token(&self, token: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.token == token)
    }
}

// =============================================================================
// Lenient date (de)serialization
// =============================================================================

/// `Option<NaiveDate>` as `"YYYY-MM-DD"`, reading empty or malformed strings
/// as `None` so that hand-edited documents still load.
pub(crate) mod lenient_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.and_then(|s| parse(&s)))
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
    }
}

/// `Option<Option<NaiveDate>>` for patches: absent keeps the stored value,
/// `null` or an empty string clears it, a date string replaces it.
mod lenient_opt_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(
        value: &Option<Option<NaiveDate>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(Some(d)) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            _ => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(Some(raw.and_then(|s| super::lenient_date::parse(&s))))
    }
}
