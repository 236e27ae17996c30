// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Clash Proxy Entries
//!
//! Typed representations of the `proxies` and `proxy-groups` entries emitted
//! into the rendered document. [`Proxy`] is internally tagged on the Clash
//! `type` field, so each protocol carries exactly the fields Clash expects
//! for it and nothing leaks between variants. Field spellings follow the
//! Clash schema (`alterId`, `ws-opts`, `reality-opts`, `dialer-proxy`).

use serde::{Deserialize, Serialize};

/// One entry of the output `proxies` list, tagged by protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Proxy {
    Vless(VlessProxy),
    Vmess(VmessProxy),
    Ss(SsProxy),
    Socks5(ExternalProxy),
    Http(ExternalProxy),
}

impl Proxy {
    pub fn name(&self) -> &str {
        match self {
            Proxy::Vless(p) => &p.name,
            Proxy::Vmess(p) => &p.name,
            Proxy::Ss(p) => &p.name,
            Proxy::Socks5(p) | Proxy::Http(p) => &p.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            Proxy::Vless(p) => p.name = name,
            Proxy::Vmess(p) => p.name = name,
            Proxy::Ss(p) => p.name = name,
            Proxy::Socks5(p) | Proxy::Http(p) => p.name = name,
        }
    }

    pub fn server(&self) -> &str {
        match self {
            Proxy::Vless(p) => &p.server,
            Proxy::Vmess(p) => &p.server,
            Proxy::Ss(p) => &p.server,
            Proxy::Socks5(p) | Proxy::Http(p) => &p.server,
        }
    }

    pub fn set_server(&mut self, server: impl Into<String>) {
        let server = server.into();
        match self {
            Proxy::Vless(p) => p.server = server,
            Proxy::Vmess(p) => p.server = server,
            Proxy::Ss(p) => p.server = server,
            Proxy::Socks5(p) | Proxy::Http(p) => p.server = server,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Proxy::Vless(p) => p.port,
            Proxy::Vmess(p) => p.port,
            Proxy::Ss(p) => p.port,
            Proxy::Socks5(p) | Proxy::Http(p) => p.port,
        }
    }
}

/// VLESS endpoint, with optional Reality/TLS and ws/grpc transports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VlessProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    #[serde(
        rename = "client-fingerprint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_fingerprint: Option<String>,
    #[serde(rename = "reality-opts", default, skip_serializing_if = "Option::is_none")]
    pub reality_opts: Option<RealityOpts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(rename = "ws-opts", default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
    #[serde(rename = "grpc-opts", default, skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOpts>,
}

/// VMess endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmessProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(rename = "alterId", default)]
    pub alter_id: u32,
    #[serde(default = "default_cipher")]
    pub cipher: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    #[serde(rename = "ws-opts", default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
}

/// Shadowsocks endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SsProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub cipher: String,
    pub password: String,
}

/// Synthesized upstream hop (socks5 or http), optionally dialed through a
/// managed node via `dialer-proxy`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "dialer-proxy", default, skip_serializing_if = "Option::is_none")]
    pub dialer_proxy: Option<String>,
}

/// Reality handshake parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealityOpts {
    #[serde(rename = "public-key")]
    pub public_key: String,
    #[serde(rename = "short-id")]
    pub short_id: String,
}

/// WebSocket transport options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WsOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<WsHeaders>,
}

/// Headers carried on the WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsHeaders {
    #[serde(rename = "Host")]
    pub host: String,
}

/// gRPC transport options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GrpcOpts {
    #[serde(
        rename = "grpc-service-name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub grpc_service_name: Option<String>,
}

fn default_network() -> String {
    "tcp".to_string()
}

fn default_cipher() -> String {
    "auto".to_string()
}

/// A parsed proxy together with the registry metadata of the node record it
/// came from. One node record can yield several of these when its url points
/// at an upstream subscription body.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub proxy: Proxy,
    pub managed_id: String,
    pub chain_with: Option<String>,
}

impl ResolvedNode {
    pub fn name(&self) -> &str {
        self.proxy.name()
    }
}

/// One entry of `proxy-groups`. Kind stays a plain string because templates
/// carry whatever group types their authors chose; only `select`, `url-test`
/// and `relay` get special treatment during synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: String,
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl ProxyGroup {
    /// A two-member relay group; the first member is dialed first.
    pub fn relay(name: impl Into<String>, first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_type: "relay".to_string(),
            proxies: vec![first.into(), second.into()],
            extra: serde_yaml::Mapping::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vless_serializes_with_clash_spellings() {
        let proxy = Proxy::Vless(VlessProxy {
            name: "hk-1".into(),
            server: "1.2.3.4".into(),
            port: 443,
            uuid: "uuid".into(),
            network: "tcp".into(),
            tls: Some(true),
            servername: Some("cdn.example.com".into()),
            client_fingerprint: Some("chrome".into()),
            reality_opts: Some(RealityOpts {
                public_key: "pbk".into(),
                short_id: "sid".into(),
            }),
            flow: Some("xtls-rprx-vision".into()),
            ws_opts: None,
            grpc_opts: None,
        });

        let yaml = serde_yaml::to_string(&proxy).unwrap();
        assert!(yaml.contains("type: vless"));
        assert!(yaml.contains("client-fingerprint: chrome"));
        assert!(yaml.contains("public-key: pbk"));
        assert!(yaml.contains("short-id: sid"));
        assert!(!yaml.contains("ws-opts"));
    }

    #[test]
    fn vmess_deserializes_from_clash_yaml() {
        let yaml = r#"
name: jp-ws
type: vmess
server: jp.example.com
port: 8443
uuid: 11111111-2222-3333-4444-555555555555
alterId: 0
cipher: auto
network: ws
tls: true
ws-opts:
  path: /ray
  headers:
    Host: jp.example.com
"#;
        let proxy: Proxy = serde_yaml::from_str(yaml).unwrap();
        match proxy {
            Proxy::Vmess(v) => {
                assert_eq!(v.alter_id, 0);
                assert_eq!(v.network, "ws");
                assert_eq!(v.ws_opts.unwrap().headers.unwrap().host, "jp.example.com");
            }
            other => panic!("expected vmess, got {other:?}"),
        }
    }

    #[test]
    fn external_hop_carries_dialer_proxy() {
        let proxy = Proxy::Socks5(ExternalProxy {
            name: "exit".into(),
            server: "10.0.0.1".into(),
            port: 1080,
            username: Some("u".into()),
            password: Some("p".into()),
            dialer_proxy: Some("hk-1".into()),
        });
        let yaml = serde_yaml::to_string(&proxy).unwrap();
        assert!(yaml.contains("type: socks5"));
        assert!(yaml.contains("dialer-proxy: hk-1"));
    }

    #[test]
    fn relay_group_orders_target_first() {
        let group = ProxyGroup::relay("link", "target", "origin");
        assert_eq!(group.proxies, vec!["target", "origin"]);
        let yaml = serde_yaml::to_string(&group).unwrap();
        assert!(yaml.contains("type: relay"));
    }
}
