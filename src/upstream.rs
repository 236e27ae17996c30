// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Upstream Resolution
//!
//! Turns node records into concrete proxy entries. A record's `url` is
//! either a direct share link, parsed in place, or an upstream subscription
//! URL whose body (base64 or plain text) yields one link per line.
//!
//! Failures stay local: an unreachable upstream or an unparseable link
//! drops that entry with a log line and resolution carries on with the
//! rest. Loopback servers are rewritten to this host's public address so
//! the emitted document works from outside the box.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::clash::proxy::ResolvedNode;
use crate::config;
use crate::links;
use crate::models::Node;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Services asked, in order, for this host's public address.
const IP_PROBES: &[&str] = &["http://v4.ident.me", "http://ifconfig.me/ip", "http://ip.sb"];

/// Placeholder emitted when no probe answers; documents stay renderable and
/// visibly wrong instead of silently broken.
pub const PUBLIC_IP_FALLBACK: &str = "your_vps_ip";

const LOOPBACK_HOST: &str = "127.0.0.1";

/// Resolves node records into proxy entries, fetching upstream sources over
/// HTTP with a fixed timeout and no retries.
#[derive(Debug, Clone)]
pub struct NodeFetcher {
    http: Client,
    public_ip: String,
}

impl NodeFetcher {
    pub fn new(public_ip: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            http,
            public_ip: public_ip.into(),
        })
    }

    pub fn public_ip(&self) -> &str {
        &self.public_ip
    }

    /// Resolves every record (optionally narrowed to a set of node ids)
    /// into zero or more proxy entries, in record order.
    pub async fn resolve(
        &self,
        records: &[Node],
        filter: Option<&HashSet<String>>,
    ) -> Vec<ResolvedNode> {
        let mut resolved = Vec::new();

        for record in records {
            if let Some(filter) = filter {
                if !filter.contains(&record.id) {
                    continue;
                }
            }

            if links::is_proxy_link(&record.url) {
                match links::parse(&record.url) {
                    Ok(mut proxy) => {
                        // The registry name wins over whatever the link carries.
                        proxy.set_name(&record.name);
                        if proxy.server() == LOOPBACK_HOST {
                            proxy.set_server(&self.public_ip);
                        }
                        resolved.push(ResolvedNode {
                            proxy,
                            managed_id: record.id.clone(),
                            chain_with: record.chain_with.clone(),
                        });
                    }
                    Err(err) => {
                        warn!(node = %record.id, error = %err, "skipping unparseable node link");
                    }
                }
                continue;
            }

            match self.fetch_body(&record.url).await {
                Ok(body) => {
                    let mut count = 0usize;
                    for link in extract_links(&body) {
                        match links::parse(&link) {
                            Ok(mut proxy) => {
                                if proxy.server() == LOOPBACK_HOST {
                                    proxy.set_server(&self.public_ip);
                                }
                                resolved.push(ResolvedNode {
                                    proxy,
                                    managed_id: record.id.clone(),
                                    chain_with: record.chain_with.clone(),
                                });
                                count += 1;
                            }
                            Err(err) => {
                                debug!(node = %record.id, error = %err, "skipping upstream link");
                            }
                        }
                    }
                    debug!(node = %record.id, proxies = count, "resolved upstream source");
                }
                Err(err) => {
                    warn!(node = %record.id, url = %record.url, error = %err, "failed to fetch upstream source");
                }
            }
        }

        resolved
    }

    async fn fetch_body(&self, url: &str) -> Result<String, reqwest::Error> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// Share links out of an upstream body: base64-decoded when the whole body
/// decodes to text, otherwise taken as plain lines.
fn extract_links(body: &str) -> Vec<String> {
    let decoded = links::decode_base64_forgiving(body)
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| body.to_string());

    decoded
        .lines()
        .map(str::trim)
        .filter(|line| line.contains("://"))
        .map(str::to_string)
        .collect()
}

/// This host's public address: the `PUBLIC_IP` override when set,
/// otherwise the first probe service that answers, otherwise a placeholder.
pub async fn detect_public_ip() -> String {
    if let Ok(configured) = std::env::var(config::PUBLIC_IP_ENV) {
        let configured = configured.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
    }

    let Ok(client) = Client::builder().timeout(PROBE_TIMEOUT).build() else {
        return PUBLIC_IP_FALLBACK.to_string();
    };

    for probe in IP_PROBES {
        match client.get(*probe).send().await {
            Ok(response) => {
                if let Ok(body) = response.text().await {
                    let ip = body.trim();
                    if !ip.is_empty() {
                        return ip.to_string();
                    }
                }
            }
            Err(err) => {
                debug!(probe, error = %err, "public ip probe failed");
            }
        }
    }

    PUBLIC_IP_FALLBACK.to_string()
}
