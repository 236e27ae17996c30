// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Document Synthesis
//!
//! Assembles the final Clash document for one request: synthesized chain
//! hops first, then the resolved managed nodes, merged into the template's
//! proxy groups, plus the `Subscription-Userinfo` figures.
//!
//! Group merging is name-based. `url-test` groups are pruned down to
//! managed node names so latency probing never hits an upstream hop twice;
//! `select` groups gain every managed node, relay group and chain hop they
//! are missing, keeping the operator's `DIRECT`/`REJECT` sentinels where
//! the template put them. Other group types pass through untouched.

use thiserror::Error;

use crate::clash::chains;
use crate::clash::proxy::ResolvedNode;
use crate::clash::template::ClashDocument;
use crate::error::ApiError;
use crate::models::{expiry_start_utc, Node, Subscription};
use crate::traffic::GIB;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("No nodes available for this subscription.")]
    NoNodesAvailable,
    #[error("failed to encode proxy entry: {0}")]
    Encode(#[from] serde_yaml::Error),
}

impl From<SynthError> for ApiError {
    fn from(err: SynthError) -> Self {
        ApiError::internal(err.to_string())
    }
}

/// Figures behind the `Subscription-Userinfo` response header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
    pub expire: i64,
}

impl UserInfo {
    pub fn header_value(&self) -> String {
        format!(
            "upload={}; download={}; total={}; expire={}",
            self.upload, self.download, self.total, self.expire
        )
    }
}

/// A rendered document plus its usage figures.
#[derive(Debug)]
pub struct Synthesis {
    pub document: ClashDocument,
    pub user_info: UserInfo,
}

/// Builds the output document.
///
/// `live_used_bytes` is the gate's freshly computed usage and only read in
/// subscription context; `node_records` are the registry records behind
/// `resolved` and feed the aggregate header on the token-less stable path.
pub fn synthesize(
    subscription: Option<&Subscription>,
    live_used_bytes: u64,
    resolved: &[ResolvedNode],
    node_records: &[Node],
    mut document: ClashDocument,
) -> Result<Synthesis, SynthError> {
    if resolved.is_empty() {
        return Err(SynthError::NoNodesAvailable);
    }

    let externals = match subscription {
        Some(sub) => {
            let specs = chains::normalize_chains(sub);
            chains::build_external_proxies(&specs, sub, resolved)
        }
        None => Vec::new(),
    };

    let managed_names: Vec<String> = resolved.iter().map(|n| n.name().to_string()).collect();
    let external_names: Vec<String> = externals
        .iter()
        .map(|p| p.name().to_string())
        .filter(|name| !managed_names.contains(name))
        .collect();

    let mut proxies = Vec::with_capacity(externals.len() + resolved.len());
    for proxy in externals.iter().chain(resolved.iter().map(|n| &n.proxy)) {
        proxies.push(serde_yaml::to_value(proxy)?);
    }
    document.proxies = proxies;

    let relays = chains::build_relay_groups(resolved);
    let relay_names: Vec<String> = relays.iter().map(|g| g.name.clone()).collect();
    document.proxy_groups.extend(relays);

    let mut select_names = managed_names.clone();
    select_names.extend(relay_names);
    select_names.extend(external_names);

    for group in &mut document.proxy_groups {
        match group.group_type.as_str() {
            "url-test" => {
                for name in &managed_names {
                    if !group.proxies.contains(name) {
                        group.proxies.push(name.clone());
                    }
                }
                group.proxies.retain(|p| managed_names.contains(p));
            }
            "select" => {
                for name in &select_names {
                    if group.proxies.contains(name) {
                        continue;
                    }
                    match group.proxies.iter().position(|p| p == "DIRECT") {
                        Some(at) => group.proxies.insert(at, name.clone()),
                        None => group.proxies.push(name.clone()),
                    }
                }
                group
                    .proxies
                    .retain(|p| select_names.contains(p) || p == "DIRECT" || p == "REJECT");
            }
            _ => {}
        }
    }

    let user_info = user_info(subscription, live_used_bytes, node_records);
    Ok(Synthesis {
        document,
        user_info,
    })
}

/// Header figures. In subscription context the quota and expiry are the
/// subscription's own; the token-less path aggregates quotas and counters
/// over the served node records and reports their earliest expiry.
fn user_info(
    subscription: Option<&Subscription>,
    live_used_bytes: u64,
    node_records: &[Node],
) -> UserInfo {
    let mut info = UserInfo::default();
    match subscription {
        Some(sub) => {
            info.download = live_used_bytes;
            info.total = (sub.limit_gb * GIB) as u64;
            if let Some(date) = sub.expiry {
                info.expire = expiry_start_utc(date).timestamp();
            }
        }
        None => {
            for node in node_records {
                info.total += (node.limit_gb * GIB) as u64;
                info.download += node.used_bytes;
                if let Some(date) = node.expiry {
                    let ts = expiry_start_utc(date).timestamp();
                    if info.expire == 0 || ts < info.expire {
                        info.expire = ts;
                    }
                }
            }
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_yaml::Value;
    use std::collections::HashMap;

    use crate::clash::proxy::{Proxy, ProxyGroup, SsProxy};
    use crate::clash::template::TemplateStore;
    use crate::models::ChainSpec;

    fn resolved(name: &str, managed_id: &str) -> ResolvedNode {
        ResolvedNode {
            proxy: Proxy::Ss(SsProxy {
                name: name.into(),
                server: "h".into(),
                port: 8388,
                cipher: "aes-128-gcm".into(),
                password: "p".into(),
            }),
            managed_id: managed_id.into(),
            chain_with: None,
        }
    }

    fn node_record(id: &str, limit_gb: f64, used: u64, expiry: Option<NaiveDate>) -> Node {
        Node {
            id: id.into(),
            name: format!("node-{id}"),
            url: "vless://u@h:443#x".into(),
            limit_gb,
            used_bytes: used,
            expiry,
            chain_with: None,
        }
    }

    fn sub() -> Subscription {
        Subscription {
            id: "s".into(),
            name: "plan".into(),
            token: "t".into(),
            node_ids: vec!["n1".into()],
            traffic_base: HashMap::new(),
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

    fn chain(name: &str, server: &str) -> ChainSpec {
        ChainSpec {
            server: server.into(),
            port: 1080,
            proxy_type: "socks5".into(),
            username: None,
            password: None,
            dialer_id: None,
            dialer_name: None,
            name: Some(name.into()),
        }
    }

    fn built_in() -> ClashDocument {
        TemplateStore::new("/nonexistent").load(None)
    }

    fn proxy_names(document: &ClashDocument) -> Vec<String> {
        document
            .proxies
            .iter()
            .map(|v| v.get("name").and_then(Value::as_str).unwrap().to_string())
            .collect()
    }

    #[test]
    fn empty_node_set_fails() {
        let err = synthesize(None, 0, &[], &[], built_in()).unwrap_err();
        assert!(matches!(err, SynthError::NoNodesAvailable));
        assert_eq!(err.to_string(), "No nodes available for this subscription.");
    }

    #[test]
    fn chain_hops_precede_managed_nodes_in_declared_order() {
        let mut s = sub();
        s.chains = vec![chain("outer", "1.1.1.1"), chain("inner", "2.2.2.2")];
        let nodes = vec![resolved("HK", "n1"), resolved("JP", "n2")];

        let out = synthesize(Some(&s), 0, &nodes, &[], built_in()).unwrap();
        assert_eq!(proxy_names(&out.document), vec!["outer", "inner", "HK", "JP"]);
    }

    #[test]
    fn url_test_groups_keep_managed_names_only() {
        let mut doc = built_in();
        doc.proxy_groups.push(ProxyGroup {
            name: "auto".into(),
            group_type: "url-test".into(),
            proxies: vec!["stale".into(), "HK".into()],
            extra: serde_yaml::Mapping::new(),
        });
        let nodes = vec![resolved("HK", "n1"), resolved("JP", "n2")];

        let out = synthesize(None, 0, &nodes, &[], doc).unwrap();
        let auto = out
            .document
            .proxy_groups
            .iter()
            .find(|g| g.name == "auto")
            .unwrap();
        assert_eq!(auto.proxies, vec!["HK", "JP"]);
    }

    #[test]
    fn select_groups_insert_before_direct_and_drop_strangers() {
        let mut doc = built_in();
        doc.proxy_groups[0].proxies =
            vec!["ghost".into(), "DIRECT".into(), "REJECT".into()];
        let mut s = sub();
        s.chains = vec![chain("exit", "1.1.1.1")];
        let nodes = vec![resolved("HK", "n1")];

        let out = synthesize(Some(&s), 0, &nodes, &[], doc).unwrap();
        let select = &out.document.proxy_groups[0];
        assert_eq!(select.proxies, vec!["HK", "exit", "DIRECT", "REJECT"]);
    }

    #[test]
    fn select_groups_without_direct_append_at_end() {
        let nodes = vec![resolved("HK", "n1"), resolved("JP", "n2")];
        let out = synthesize(None, 0, &nodes, &[], built_in()).unwrap();
        assert_eq!(out.document.proxy_groups[0].proxies, vec!["HK", "JP"]);
    }

    #[test]
    fn relay_groups_are_appended_and_selectable() {
        let mut origin = resolved("Origin", "n1");
        origin.chain_with = Some("Exit".into());
        let nodes = vec![origin, resolved("Exit", "n2")];

        let out = synthesize(None, 0, &nodes, &[], built_in()).unwrap();
        let relay = out
            .document
            .proxy_groups
            .iter()
            .find(|g| g.group_type == "relay")
            .unwrap();
        assert_eq!(relay.name, "🔗 Origin -> Exit");
        assert_eq!(relay.proxies, vec!["Exit", "Origin"]);
        assert!(out.document.proxy_groups[0]
            .proxies
            .contains(&"🔗 Origin -> Exit".to_string()));
    }

    #[test]
    fn chain_hop_named_like_a_node_is_not_doubled_in_selects() {
        let mut s = sub();
        s.chains = vec![chain("HK", "1.1.1.1")];
        let nodes = vec![resolved("HK", "n1")];

        let out = synthesize(Some(&s), 0, &nodes, &[], built_in()).unwrap();
        let select = &out.document.proxy_groups[0];
        assert_eq!(select.proxies.iter().filter(|p| *p == "HK").count(), 1);
    }

    #[test]
    fn subscription_header_reports_plan_figures() {
        let mut s = sub();
        s.limit_gb = 5.0;
        s.expiry = NaiveDate::from_ymd_opt(2026, 9, 1);
        let nodes = vec![resolved("HK", "n1")];

        let out = synthesize(Some(&s), 4_000_000_000, &nodes, &[], built_in()).unwrap();
        let expire = expiry_start_utc(s.expiry.unwrap()).timestamp();
        assert_eq!(
            out.user_info.header_value(),
            format!("upload=0; download=4000000000; total=5368709120; expire={expire}")
        );
    }

    #[test]
    fn unlimited_plan_reports_zero_total_and_expire() {
        let s = sub();
        let nodes = vec![resolved("HK", "n1")];
        let out = synthesize(Some(&s), 123, &nodes, &[], built_in()).unwrap();
        assert_eq!(out.user_info.header_value(), "upload=0; download=123; total=0; expire=0");
    }

    #[test]
    fn stable_path_aggregates_node_figures() {
        let far = NaiveDate::from_ymd_opt(2027, 1, 1);
        let near = NaiveDate::from_ymd_opt(2026, 10, 1);
        let records = vec![
            node_record("n1", 1.0, 100, far),
            node_record("n2", 2.0, 250, near),
            node_record("n3", 0.0, 50, None),
        ];
        let nodes = vec![resolved("HK", "n1")];

        let out = synthesize(None, 0, &nodes, &records, built_in()).unwrap();
        assert_eq!(out.user_info.download, 400);
        assert_eq!(out.user_info.total, 3 * (1u64 << 30));
        assert_eq!(
            out.user_info.expire,
            expiry_start_utc(near.unwrap()).timestamp()
        );
    }
}
