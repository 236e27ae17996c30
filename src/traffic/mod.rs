// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Traffic Accounting
//!
//! Usage is metered as deltas over raw cumulative counters owned by an
//! external source (the 3x-ui database, see [`xui`]). Counters are keyed by
//! inbound port; a node maps to its counter through the port of its `url`.
//!
//! The arithmetic here is deliberately one-way: a counter that regresses
//! below a subscription's baseline (external reset, database swap) clamps
//! that node's contribution to zero rather than going negative or guessing
//! at what happened.

pub mod xui;

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::models::{Node, Subscription};

pub use xui::XuiDatabase;

/// Bytes per GiB; quotas are configured in GiB.
pub const GIB: f64 = 1_073_741_824.0;

#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("counter database unavailable: {0}")]
    Unavailable(String),
    #[error("counter query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// External source of cumulative traffic counters, keyed by inbound port.
pub trait TrafficSource: Send + Sync {
    fn counters_by_port(&self) -> Result<HashMap<u16, u64>, TrafficError>;
}

/// Source for deployments without a counter database; every node keeps its
/// stored counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrafficSource;

impl TrafficSource for NullTrafficSource {
    fn counters_by_port(&self) -> Result<HashMap<u16, u64>, TrafficError> {
        Ok(HashMap::new())
    }
}

/// Pulls current raw counters into the node records. Nodes whose url has no
/// parseable port, or no counter row, keep their stored `used_bytes`. A
/// source failure logs and leaves every node untouched.
pub fn refresh(nodes: &mut [Node], source: &dyn TrafficSource) {
    let counters = match source.counters_by_port() {
        Ok(counters) => counters,
        Err(err) => {
            warn!(error = %err, "traffic refresh failed, serving stored counters");
            return;
        }
    };
    for node in nodes.iter_mut() {
        if let Some(port) = counter_port(&node.url) {
            if let Some(&total) = counters.get(&port) {
                node.used_bytes = total;
            }
        }
    }
}

/// The counter key of a node: the explicit port of its url, if any.
pub fn counter_port(url: &str) -> Option<u16> {
    Url::parse(url).ok().and_then(|u| u.port())
}

/// Live usage of a subscription: `Σ max(0, used_bytes − baseline)` over its
/// referenced nodes. Ids absent from the node set contribute nothing.
pub fn subscription_usage(sub: &Subscription, nodes: &[Node]) -> u64 {
    let by_id: HashMap<&str, u64> = nodes.iter().map(|n| (n.id.as_str(), n.used_bytes)).collect();
    sub.node_ids
        .iter()
        .filter_map(|nid| {
            by_id.get(nid.as_str()).map(|&used| {
                let base = sub.traffic_base.get(nid).copied().unwrap_or(0);
                used.saturating_sub(base)
            })
        })
        .sum()
}

/// Rebases the subscription on the nodes' current counters and zeroes its
/// reported usage. Call only against freshly refreshed nodes; resetting on
/// stale counters silently grants the staleness as free quota.
pub fn reset_baseline(sub: &mut Subscription, nodes: &[Node]) {
    let mut base = HashMap::new();
    for node in nodes {
        if sub.node_ids.contains(&node.id) {
            base.insert(node.id.clone(), node.used_bytes);
        }
    }
    sub.traffic_base = base;
    sub.used_bytes = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSource(HashMap<u16, u64>);

    impl TrafficSource for StubSource {
        fn counters_by_port(&self) -> Result<HashMap<u16, u64>, TrafficError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl TrafficSource for FailingSource {
        fn counters_by_port(&self) -> Result<HashMap<u16, u64>, TrafficError> {
            Err(TrafficError::Unavailable("db gone".into()))
        }
    }

    fn node(id: &str, url: &str, used: u64) -> Node {
        Node {
            id: id.into(),
            name: format!("node-{id}"),
            url: url.into(),
            limit_gb: 0.0,
            used_bytes: used,
            expiry: None,
            chain_with: None,
        }
    }

    fn sub(node_ids: &[&str], base: &[(&str, u64)]) -> Subscription {
        Subscription {
            id: "s1".into(),
            name: "plan".into(),
            token: "tok".into(),
            node_ids: node_ids.iter().map(|s| s.to_string()).collect(),
            traffic_base: base.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            limit_gb: 0.0,
            used_bytes: 0,
            expiry: None,
            status: "active".into(),
            is_guest: false,
            chains: Vec::new(),
            external_proxy: None,
            dialer_id: None,
            dialer_name: None,
            template: None,
        }
    }

    #[test]
    fn refresh_updates_only_matching_ports() {
        let mut nodes = vec![
            node("0", "vless://u@1.2.3.4:443?security=tls#a", 10),
            node("1", "vless://u@1.2.3.4:8443#b", 20),
            node("2", "https://upstream.example.com/sub", 30),
        ];
        let source = StubSource(HashMap::from([(443, 999), (9999, 1)]));
        refresh(&mut nodes, &source);
        assert_eq!(nodes[0].used_bytes, 999);
        assert_eq!(nodes[1].used_bytes, 20);
        assert_eq!(nodes[2].used_bytes, 30);
    }

    #[test]
    fn refresh_failure_keeps_stored_counters() {
        let mut nodes = vec![node("0", "vless://u@h:443#a", 77)];
        refresh(&mut nodes, &FailingSource);
        assert_eq!(nodes[0].used_bytes, 77);
    }

    #[test]
    fn usage_sums_deltas_over_baselines() {
        let nodes = vec![
            node("0", "u", 1_500),
            node("1", "u", 800),
            node("2", "u", 50_000),
        ];
        let sub = sub(&["0", "1", "missing"], &[("0", 1_000), ("1", 800)]);
        // 500 from node 0, 0 from node 1, nothing for the unknown id.
        assert_eq!(subscription_usage(&sub, &nodes), 500);
    }

    #[test]
    fn usage_clamps_counter_regressions_to_zero() {
        let nodes = vec![node("0", "u", 100)];
        let sub = sub(&["0"], &[("0", 5_000)]);
        assert_eq!(subscription_usage(&sub, &nodes), 0);
    }

    #[test]
    fn missing_baseline_counts_from_zero() {
        let nodes = vec![node("0", "u", 42)];
        let sub = sub(&["0"], &[]);
        assert_eq!(subscription_usage(&sub, &nodes), 42);
    }

    #[test]
    fn reset_rebases_and_zeroes_usage() {
        let nodes = vec![node("0", "u", 9_000), node("1", "u", 1_234)];
        let mut sub = sub(&["0"], &[("0", 2_000), ("gone", 7)]);
        sub.used_bytes = 7_000;

        reset_baseline(&mut sub, &nodes);
        assert_eq!(sub.traffic_base.get("0"), Some(&9_000));
        assert!(!sub.traffic_base.contains_key("gone"));
        assert!(!sub.traffic_base.contains_key("1"));
        assert_eq!(sub.used_bytes, 0);
        assert_eq!(subscription_usage(&sub, &nodes), 0);
    }

    #[test]
    fn reset_is_idempotent_between_counter_advances() {
        let nodes = vec![node("0", "u", 9_000)];
        let mut sub = sub(&["0"], &[]);

        reset_baseline(&mut sub, &nodes);
        let first = sub.traffic_base.clone();
        reset_baseline(&mut sub, &nodes);
        assert_eq!(sub.traffic_base, first);
        assert_eq!(subscription_usage(&sub, &nodes), 0);
    }

    #[test]
    fn counter_port_reads_explicit_ports_only() {
        assert_eq!(counter_port("vless://u@1.2.3.4:443?x=1#n"), Some(443));
        assert_eq!(counter_port("ss://YWJj@9.9.9.9:8388#n"), Some(8388));
        assert_eq!(counter_port("https://pool.example.com/clash.yaml"), None);
        assert_eq!(counter_port("not a url"), None);
    }
}
