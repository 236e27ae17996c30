// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain Resolution
//!
//! Subscriptions can route their traffic through upstream hops before it
//! reaches a managed node. Each hop is a [`ChainSpec`]; this module turns
//! those specs into concrete proxy entries, binding every hop to a dialer
//! node by a fixed priority ladder, and builds the two-member relay groups
//! declared by `chain_with` on nodes.
//!
//! Chains are declared outermost first and the builder keeps that order:
//! the first spec in `chains` is the first entry of the output proxy list,
//! ahead of every managed node.

use std::collections::HashSet;

use crate::clash::proxy::{ExternalProxy, Proxy, ProxyGroup, ResolvedNode};
use crate::models::{ChainSpec, Subscription};

/// Display name for a chain hop that does not carry one.
pub const DEFAULT_CHAIN_NAME: &str = "🛸 运营专线";

/// Display name given to a legacy single-hop `external_proxy`.
pub const LEGACY_CHAIN_NAME: &str = "🇺🇸 运营专线 (美国静态)";

/// Marker used by the oldest deployments to tag their preferred dialer node.
const LEGACY_DIALER_MARKER: &str = "DMIT";

/// The subscription's chain list, with the legacy single-hop field folded
/// in. A legacy hop gets the legacy display name and inherits the
/// subscription-level dialer selection for anything it does not set itself.
pub fn normalize_chains(sub: &Subscription) -> Vec<ChainSpec> {
    if !sub.chains.is_empty() {
        return sub.chains.clone();
    }

    let Some(legacy) = &sub.external_proxy else {
        return Vec::new();
    };

    let mut chain = legacy.clone();
    if chain.name.is_none() {
        chain.name = Some(LEGACY_CHAIN_NAME.to_string());
    }
    if chain.dialer_id.is_none() {
        chain.dialer_id = sub.dialer_id.clone();
    }
    if chain.dialer_name.is_none() {
        chain.dialer_name = sub.dialer_name.clone();
    }
    vec![chain]
}

/// Picks the managed node a chain hop dials through. First match wins:
/// explicit node id, node-name substring (case-insensitive), the legacy
/// `DMIT` marker, finally the first resolved node. `None` only when the
/// resolved list is empty.
pub fn resolve_dialer(
    chain: &ChainSpec,
    sub: &Subscription,
    nodes: &[ResolvedNode],
) -> Option<String> {
    if let Some(id) = non_empty(&chain.dialer_id).or_else(|| non_empty(&sub.dialer_id)) {
        if let Some(node) = nodes.iter().find(|n| n.managed_id == id) {
            return Some(node.name().to_string());
        }
    }

    if let Some(needle) = non_empty(&chain.dialer_name).or_else(|| non_empty(&sub.dialer_name)) {
        let needle = needle.to_lowercase();
        if let Some(node) = nodes
            .iter()
            .find(|n| n.name().to_lowercase().contains(&needle))
        {
            return Some(node.name().to_string());
        }
    }

    if let Some(node) = nodes.iter().find(|n| n.name().contains(LEGACY_DIALER_MARKER)) {
        return Some(node.name().to_string());
    }

    nodes.first().map(|n| n.name().to_string())
}

/// Builds the synthesized hop entries in declared order. Entries missing a
/// server or port are skipped. `http` hops keep their protocol; everything
/// else is emitted as socks5. A username implies basic auth with an empty
/// default password.
pub fn build_external_proxies(
    chains: &[ChainSpec],
    sub: &Subscription,
    nodes: &[ResolvedNode],
) -> Vec<Proxy> {
    let mut proxies = Vec::new();

    for chain in chains {
        if chain.server.is_empty() || chain.port == 0 {
            continue;
        }

        let username = non_empty(&chain.username).map(str::to_string);
        let password = username
            .is_some()
            .then(|| chain.password.clone().unwrap_or_default());

        let hop = ExternalProxy {
            name: chain
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_CHAIN_NAME.to_string()),
            server: chain.server.clone(),
            port: chain.port,
            username,
            password,
            dialer_proxy: resolve_dialer(chain, sub, nodes),
        };

        proxies.push(if chain.proxy_type == "http" {
            Proxy::Http(hop)
        } else {
            Proxy::Socks5(hop)
        });
    }

    proxies
}

/// Two-member relay groups for nodes whose `chain_with` names another node
/// in the resolved set. The target is dialed first, then the node itself.
pub fn build_relay_groups(nodes: &[ResolvedNode]) -> Vec<ProxyGroup> {
    let managed: HashSet<&str> = nodes.iter().map(|n| n.name()).collect();

    nodes
        .iter()
        .filter_map(|node| {
            let target = node.chain_with.as_deref().filter(|t| !t.is_empty())?;
            if !managed.contains(target) {
                return None;
            }
            Some(ProxyGroup::relay(
                format!("🔗 {} -> {}", node.name(), target),
                target,
                node.name(),
            ))
        })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clash::proxy::SsProxy;
    use std::collections::HashMap;

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

    fn chain(server: &str, port: u16) -> ChainSpec {
        ChainSpec {
            server: server.into(),
            port,
            proxy_type: "socks5".into(),
            username: None,
            password: None,
            dialer_id: None,
            dialer_name: None,
            name: None,
        }
    }

    fn sub() -> Subscription {
        Subscription {
            id: "s".into(),
            name: "s".into(),
            token: "t".into(),
            node_ids: Vec::new(),
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

    #[test]
    fn chains_list_wins_over_legacy_field() {
        let mut s = sub();
        s.chains = vec![chain("a", 1)];
        s.external_proxy = Some(chain("b", 2));
        let normalized = normalize_chains(&s);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].server, "a");
    }

    #[test]
    fn legacy_field_becomes_single_named_chain() {
        let mut s = sub();
        s.external_proxy = Some(chain("b", 2));
        s.dialer_id = Some("n2".into());
        s.dialer_name = Some("hk".into());

        let normalized = normalize_chains(&s);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].name.as_deref(), Some(LEGACY_CHAIN_NAME));
        assert_eq!(normalized[0].dialer_id.as_deref(), Some("n2"));
        assert_eq!(normalized[0].dialer_name.as_deref(), Some("hk"));
    }

    #[test]
    fn legacy_chain_keeps_its_own_dialer_fields() {
        let mut s = sub();
        let mut legacy = chain("b", 2);
        legacy.dialer_id = Some("own".into());
        s.external_proxy = Some(legacy);
        s.dialer_id = Some("sub-level".into());

        let normalized = normalize_chains(&s);
        assert_eq!(normalized[0].dialer_id.as_deref(), Some("own"));
    }

    #[test]
    fn dialer_id_outranks_name_match() {
        let nodes = vec![resolved("Tokyo DMIT", "n1"), resolved("HK Prime", "n2")];
        let mut c = chain("x", 1);
        c.dialer_id = Some("n2".into());
        c.dialer_name = Some("tokyo".into());
        assert_eq!(resolve_dialer(&c, &sub(), &nodes), Some("HK Prime".into()));
    }

    #[test]
    fn unresolvable_id_falls_through_to_name() {
        let nodes = vec![resolved("Tokyo-1", "n1"), resolved("HK Prime", "n2")];
        let mut c = chain("x", 1);
        c.dialer_id = Some("missing".into());
        c.dialer_name = Some("hk".into());
        assert_eq!(resolve_dialer(&c, &sub(), &nodes), Some("HK Prime".into()));
    }

    #[test]
    fn name_match_is_case_insensitive_substring() {
        let nodes = vec![resolved("US West", "n1"), resolved("Osaka-JP-03", "n2")];
        let mut c = chain("x", 1);
        c.dialer_name = Some("osaka-jp".into());
        assert_eq!(resolve_dialer(&c, &sub(), &nodes), Some("Osaka-JP-03".into()));
    }

    #[test]
    fn marker_then_first_node_fallbacks() {
        let nodes = vec![resolved("US West", "n1"), resolved("LA DMIT 9950", "n2")];
        assert_eq!(
            resolve_dialer(&chain("x", 1), &sub(), &nodes),
            Some("LA DMIT 9950".into())
        );

        let nodes = vec![resolved("US West", "n1"), resolved("HK Prime", "n2")];
        assert_eq!(
            resolve_dialer(&chain("x", 1), &sub(), &nodes),
            Some("US West".into())
        );

        assert_eq!(resolve_dialer(&chain("x", 1), &sub(), &[]), None);
    }

    #[test]
    fn subscription_dialer_fields_back_fill_the_chain() {
        let nodes = vec![resolved("US West", "n1"), resolved("HK Prime", "n2")];
        let mut s = sub();
        s.dialer_id = Some("n2".into());
        assert_eq!(
            resolve_dialer(&chain("x", 1), &s, &nodes),
            Some("HK Prime".into())
        );
    }

    #[test]
    fn incomplete_hops_are_skipped() {
        let s = sub();
        let specs = vec![chain("", 1080), chain("10.0.0.1", 0), chain("10.0.0.2", 1080)];
        let proxies = build_external_proxies(&specs, &s, &[]);
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].server(), "10.0.0.2");
    }

    #[test]
    fn hops_keep_declared_order_and_defaults() {
        let s = sub();
        let mut first = chain("1.1.1.1", 1080);
        first.name = Some("outer".into());
        let second = chain("2.2.2.2", 1080);

        let proxies = build_external_proxies(&[first, second], &s, &[]);
        assert_eq!(proxies[0].name(), "outer");
        assert_eq!(proxies[1].name(), DEFAULT_CHAIN_NAME);
    }

    #[test]
    fn username_implies_empty_default_password() {
        let s = sub();
        let mut c = chain("1.1.1.1", 1080);
        c.username = Some("user".into());
        let proxies = build_external_proxies(&[c], &s, &[]);
        match &proxies[0] {
            Proxy::Socks5(hop) => {
                assert_eq!(hop.username.as_deref(), Some("user"));
                assert_eq!(hop.password.as_deref(), Some(""));
            }
            other => panic!("expected socks5, got {other:?}"),
        }
    }

    #[test]
    fn http_hops_keep_their_protocol() {
        let s = sub();
        let mut c = chain("1.1.1.1", 8080);
        c.proxy_type = "http".into();
        let proxies = build_external_proxies(&[c], &s, &[]);
        assert!(matches!(proxies[0], Proxy::Http(_)));
    }

    #[test]
    fn hops_dial_through_the_resolved_node() {
        let s = sub();
        let nodes = vec![resolved("HK Prime", "n1")];
        let proxies = build_external_proxies(&[chain("1.1.1.1", 1080)], &s, &nodes);
        match &proxies[0] {
            Proxy::Socks5(hop) => assert_eq!(hop.dialer_proxy.as_deref(), Some("HK Prime")),
            other => panic!("expected socks5, got {other:?}"),
        }
    }

    #[test]
    fn relay_groups_need_a_managed_target() {
        let mut a = resolved("Origin", "n1");
        a.chain_with = Some("Exit".into());
        let mut b = resolved("Orphan", "n2");
        b.chain_with = Some("Elsewhere".into());
        let exit = resolved("Exit", "n3");

        let groups = build_relay_groups(&[a, b, exit]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "🔗 Origin -> Exit");
        assert_eq!(groups[0].group_type, "relay");
        assert_eq!(groups[0].proxies, vec!["Exit", "Origin"]);
    }
}
