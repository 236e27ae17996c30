// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Proxy Link Parsing
//!
//! Turns share links (`vless://`, `vmess://`, `ss://`) into typed
//! [`Proxy`] records. Parsing is deliberately tolerant where the wild
//! formats are sloppy (unpadded base64, string-typed ports in vmess JSON,
//! percent-encoded emoji names) and strict about the parts Clash cannot
//! work without (server and port).

use std::collections::HashMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::clash::proxy::{
    GrpcOpts, Proxy, RealityOpts, SsProxy, VlessProxy, VmessProxy, WsHeaders, WsOpts,
};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("unsupported link scheme in {0:?}")]
    UnsupportedScheme(String),
    #[error("invalid vless link: {0}")]
    InvalidVless(String),
    #[error("invalid vmess link: {0}")]
    InvalidVmess(String),
    #[error("invalid ss link: {0}")]
    InvalidSs(String),
}

/// Whether `url` is a direct share link rather than an upstream
/// subscription URL.
pub fn is_proxy_link(url: &str) -> bool {
    url.starts_with("vless://") || url.starts_with("vmess://") || url.starts_with("ss://")
}

/// Parses a single share link into a typed proxy entry.
pub fn parse(link: &str) -> Result<Proxy, LinkError> {
    let link = link.trim();
    if let Some(rest) = link.strip_prefix("vless://") {
        parse_vless(rest)
    } else if let Some(rest) = link.strip_prefix("vmess://") {
        parse_vmess(rest)
    } else if let Some(rest) = link.strip_prefix("ss://") {
        parse_ss(rest)
    } else {
        let head: String = link.chars().take(24).collect();
        Err(LinkError::UnsupportedScheme(head))
    }
}

/// `uuid@server:port?params#name`
fn parse_vless(rest: &str) -> Result<Proxy, LinkError> {
    let (rest, name) = split_fragment(rest, "VLESS");
    let (main_part, params) = match rest.split_once('?') {
        Some((main, query)) => (main, query_params(query)),
        None => (rest, HashMap::new()),
    };

    let (uuid, host_part) = main_part
        .split_once('@')
        .ok_or_else(|| LinkError::InvalidVless(format!("missing '@' in {main_part:?}")))?;
    let (server, port) = split_host_port(host_part)
        .ok_or_else(|| LinkError::InvalidVless(format!("missing port in {host_part:?}")))?;

    let network = params
        .get("type")
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| "tcp".to_string());

    let mut proxy = VlessProxy {
        name,
        server: server.to_string(),
        port,
        uuid: uuid.to_string(),
        network: network.clone(),
        tls: None,
        servername: None,
        client_fingerprint: None,
        reality_opts: None,
        flow: None,
        ws_opts: None,
        grpc_opts: None,
    };

    match params.get("security").map(String::as_str) {
        Some("reality") => {
            proxy.tls = Some(true);
            proxy.servername = Some(params.get("sni").cloned().unwrap_or_default());
            proxy.client_fingerprint = Some(
                non_empty(&params, "fp").unwrap_or_else(|| "chrome".to_string()),
            );
            proxy.reality_opts = Some(RealityOpts {
                public_key: params.get("pbk").cloned().unwrap_or_default(),
                short_id: params.get("sid").cloned().unwrap_or_default(),
            });
        }
        Some("tls") => {
            proxy.tls = Some(true);
            proxy.servername = Some(params.get("sni").cloned().unwrap_or_default());
            proxy.client_fingerprint = non_empty(&params, "fp");
        }
        _ => {}
    }

    proxy.flow = non_empty(&params, "flow");

    if network == "ws" {
        proxy.ws_opts = Some(WsOpts {
            path: non_empty(&params, "path"),
            headers: non_empty(&params, "host").map(|host| WsHeaders { host }),
        });
    }
    if network == "grpc" {
        proxy.grpc_opts = Some(GrpcOpts {
            grpc_service_name: non_empty(&params, "serviceName"),
        });
    }

    Ok(Proxy::Vless(proxy))
}

/// `base64(json)` with the usual v2rayN field names.
fn parse_vmess(rest: &str) -> Result<Proxy, LinkError> {
    let decoded = decode_base64_forgiving(rest)
        .ok_or_else(|| LinkError::InvalidVmess("payload is not base64".to_string()))?;
    let payload: VmessPayload = serde_json::from_slice(&decoded)
        .map_err(|e| LinkError::InvalidVmess(format!("payload is not vmess JSON: {e}")))?;

    let net = payload.net.clone().unwrap_or_else(|| "tcp".to_string());
    let tls = payload.tls.as_deref() == Some("tls");

    let ws_opts = (net == "ws").then(|| WsOpts {
        path: payload.path.clone().filter(|p| !p.is_empty()),
        headers: payload
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .map(|host| WsHeaders { host }),
    });

    Ok(Proxy::Vmess(VmessProxy {
        name: payload.ps.clone().filter(|n| !n.is_empty()).unwrap_or_else(|| "VMess".to_string()),
        server: payload.add.clone().unwrap_or_default(),
        port: lenient_number(payload.port.as_ref()).unwrap_or(443) as u16,
        uuid: payload.id.clone().unwrap_or_default(),
        alter_id: lenient_number(payload.aid.as_ref()).unwrap_or(0) as u32,
        cipher: payload.scy.clone().filter(|c| !c.is_empty()).unwrap_or_else(|| "auto".to_string()),
        network: net,
        tls: tls.then_some(true),
        servername: tls.then(|| payload.sni.clone()).flatten().filter(|s| !s.is_empty()),
        ws_opts,
    }))
}

/// `base64(method:password)@server:port#name`, or the fully encoded form
/// `base64(method:password@server:port)#name`.
fn parse_ss(rest: &str) -> Result<Proxy, LinkError> {
    let (rest, name) = split_fragment(rest, "Shadowsocks");

    if let Some((auth_part, server_part)) = rest.rsplit_once('@') {
        let auth = decode_base64_forgiving(auth_part)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| LinkError::InvalidSs("auth segment is not base64".to_string()))?;
        let (method, password) = auth
            .split_once(':')
            .ok_or_else(|| LinkError::InvalidSs("auth segment lacks ':'".to_string()))?;
        let (server, port) = split_host_port(server_part)
            .ok_or_else(|| LinkError::InvalidSs(format!("missing port in {server_part:?}")))?;
        return Ok(Proxy::Ss(SsProxy {
            name,
            server: server.to_string(),
            port,
            cipher: method.to_string(),
            password: password.to_string(),
        }));
    }

    let decoded = decode_base64_forgiving(rest)
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| LinkError::InvalidSs("payload is not base64".to_string()))?;
    let (method, tail) = decoded
        .split_once(':')
        .ok_or_else(|| LinkError::InvalidSs("decoded payload lacks ':'".to_string()))?;
    let (password, server_part) = tail
        .split_once('@')
        .ok_or_else(|| LinkError::InvalidSs("decoded payload lacks '@'".to_string()))?;
    let (server, port) = split_host_port(server_part)
        .ok_or_else(|| LinkError::InvalidSs(format!("missing port in {server_part:?}")))?;

    Ok(Proxy::Ss(SsProxy {
        name,
        server: server.to_string(),
        port,
        cipher: method.to_string(),
        password: password.to_string(),
    }))
}

/// Share-link fields of the v2rayN vmess JSON. Ports and alter ids arrive
/// as numbers or strings depending on the exporting client.
#[derive(Debug, serde::Deserialize)]
struct VmessPayload {
    #[serde(default)]
    ps: Option<String>,
    #[serde(default)]
    add: Option<String>,
    #[serde(default)]
    port: Option<serde_json::Value>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    aid: Option<serde_json::Value>,
    #[serde(default)]
    scy: Option<String>,
    #[serde(default)]
    net: Option<String>,
    #[serde(default)]
    tls: Option<String>,
    #[serde(default)]
    sni: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    host: Option<String>,
}

/// Splits off a `#fragment` display name, percent-decoded, with a fallback.
fn split_fragment<'a>(rest: &'a str, fallback: &str) -> (&'a str, String) {
    match rest.rsplit_once('#') {
        Some((head, frag)) => {
            let name = percent_decode_str(frag).decode_utf8_lossy().into_owned();
            let name = if name.is_empty() { fallback.to_string() } else { name };
            (head, name)
        }
        None => (rest, fallback.to_string()),
    }
}

/// `server:port`, taking the last colon so ports survive odd hostnames.
/// Trailing non-digits after the port are ignored (some exporters append a
/// path segment).
fn split_host_port(input: &str) -> Option<(&str, u16)> {
    let (server, port_part) = input.rsplit_once(':')?;
    let digits: String = port_part.chars().take_while(|c| c.is_ascii_digit()).collect();
    let port: u16 = digits.parse().ok()?;
    if server.is_empty() {
        return None;
    }
    Some((server, port))
}

/// First-occurrence-wins query parameters, percent-decoded.
fn query_params(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        map.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    map
}

fn non_empty(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).filter(|v| !v.is_empty()).cloned()
}

fn lenient_number(value: Option<&serde_json::Value>) -> Option<u64> {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decodes base64 that may arrive unpadded, wrapped across lines, or in the
/// URL-safe alphabet.
pub fn decode_base64_forgiving(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let stripped = compact.trim_end_matches('=');
    let padded = match stripped.len() % 4 {
        2 => format!("{stripped}=="),
        3 => format!("{stripped}="),
        1 => return None,
        _ => stripped.to_string(),
    };
    STANDARD
        .decode(padded.as_bytes())
        .or_else(|_| URL_SAFE.decode(padded.as_bytes()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reality_vless_link() {
        let link = "vless://9a5c7f2e-1111-2222-3333-444455556666@1.2.3.4:443?security=reality&sni=www.apple.com&fp=chrome&pbk=PUBKEY&sid=6ba85179&type=tcp&flow=xtls-rprx-vision#%F0%9F%87%AD%F0%9F%87%B0%20HK-01";
        let proxy = parse(link).unwrap();
        let Proxy::Vless(v) = proxy else { panic!("expected vless") };
        assert_eq!(v.name, "🇭🇰 HK-01");
        assert_eq!(v.server, "1.2.3.4");
        assert_eq!(v.port, 443);
        assert_eq!(v.uuid, "9a5c7f2e-1111-2222-3333-444455556666");
        assert_eq!(v.tls, Some(true));
        assert_eq!(v.servername.as_deref(), Some("www.apple.com"));
        assert_eq!(v.flow.as_deref(), Some("xtls-rprx-vision"));
        let reality = v.reality_opts.unwrap();
        assert_eq!(reality.public_key, "PUBKEY");
        assert_eq!(reality.short_id, "6ba85179");
    }

    #[test]
    fn parses_ws_vless_with_empty_fingerprint_dropped() {
        let link =
            "vless://u@ws.example.com:2053?type=ws&security=tls&sni=cdn.example.com&path=%2Fray&host=cdn.example.com#ws";
        let Proxy::Vless(v) = parse(link).unwrap() else { panic!() };
        assert_eq!(v.network, "ws");
        assert!(v.client_fingerprint.is_none());
        let ws = v.ws_opts.unwrap();
        assert_eq!(ws.path.as_deref(), Some("/ray"));
        assert_eq!(ws.headers.unwrap().host, "cdn.example.com");
    }

    #[test]
    fn parses_grpc_vless_service_name() {
        let link = "vless://u@gr.example.com:443?type=grpc&serviceName=tun#grpc";
        let Proxy::Vless(v) = parse(link).unwrap() else { panic!() };
        assert_eq!(
            v.grpc_opts.unwrap().grpc_service_name.as_deref(),
            Some("tun")
        );
    }

    #[test]
    fn vless_without_fragment_gets_default_name() {
        let Proxy::Vless(v) = parse("vless://u@h.example.com:443").unwrap() else { panic!() };
        assert_eq!(v.name, "VLESS");
        assert_eq!(v.network, "tcp");
        assert!(v.tls.is_none());
    }

    #[test]
    fn parses_vmess_with_string_port() {
        let json = r#"{"ps":"JP-WS","add":"jp.example.com","port":"8443","id":"abcd","aid":"0","scy":"auto","net":"ws","tls":"tls","sni":"jp.example.com","path":"/ray","host":"jp.example.com"}"#;
        let link = format!("vmess://{}", STANDARD.encode(json));
        let Proxy::Vmess(v) = parse(&link).unwrap() else { panic!() };
        assert_eq!(v.name, "JP-WS");
        assert_eq!(v.port, 8443);
        assert_eq!(v.alter_id, 0);
        assert_eq!(v.tls, Some(true));
        assert_eq!(v.servername.as_deref(), Some("jp.example.com"));
        assert_eq!(v.ws_opts.unwrap().path.as_deref(), Some("/ray"));
    }

    #[test]
    fn parses_ss_with_encoded_auth_and_no_padding() {
        let auth = STANDARD.encode("aes-256-gcm:secret");
        let link = format!("ss://{}@5.6.7.8:8388#SS-1", auth.trim_end_matches('='));
        let Proxy::Ss(ss) = parse(&link).unwrap() else { panic!() };
        assert_eq!(ss.name, "SS-1");
        assert_eq!(ss.cipher, "aes-256-gcm");
        assert_eq!(ss.password, "secret");
        assert_eq!(ss.port, 8388);
    }

    #[test]
    fn parses_fully_encoded_ss_form() {
        let link = format!("ss://{}", STANDARD.encode("aes-128-gcm:pw@9.9.9.9:443"));
        let Proxy::Ss(ss) = parse(&link).unwrap() else { panic!() };
        assert_eq!(ss.server, "9.9.9.9");
        assert_eq!(ss.cipher, "aes-128-gcm");
        assert_eq!(ss.password, "pw");
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            parse("trojan://pw@h:443#x"),
            Err(LinkError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_vless_without_authority() {
        assert!(matches!(
            parse("vless://justauuid"),
            Err(LinkError::InvalidVless(_))
        ));
    }

    #[test]
    fn forgiving_decoder_handles_wrapped_lines() {
        let encoded = STANDARD.encode("vless://a@b:1#x\nvless://c@d:2#y");
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
        let decoded = decode_base64_forgiving(&wrapped).unwrap();
        assert_eq!(decoded, b"vless://a@b:1#x\nvless://c@d:2#y");
    }
}
