// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Rules Templates
//!
//! A rendered document starts from a template: global Clash settings plus
//! the operator's proxy-groups and routing rules. Templates live as YAML
//! files in a directory; a subscription may name one, otherwise the stock
//! `base-rules.yaml` is used, and when no file is readable at all a built-in
//! minimal document keeps the endpoint serving.
//!
//! Template names are opaque file names. Anything that looks like a path
//! (separators, parent references) is refused and treated as missing.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::warn;

use crate::clash::proxy::ProxyGroup;
use crate::config;

/// File name of the stock template.
pub const DEFAULT_TEMPLATE: &str = "base-rules.yaml";

/// Selector group used by the built-in fallback document.
pub const DEFAULT_SELECT_GROUP: &str = "🚀 代理选择";

/// The full output document. Global settings the synthesizer never touches
/// (ports, dns, mode, ...) ride along in `extra` and serialize first, in
/// template order; the three managed sections follow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClashDocument {
    #[serde(flatten)]
    pub extra: Mapping,
    #[serde(default)]
    pub proxies: Vec<Value>,
    #[serde(
        rename = "proxy-groups",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub proxy_groups: Vec<ProxyGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
}

/// Loads named templates from a directory, with fallbacks.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory from `TEMPLATES_DIR`, or the bundled default.
    pub fn from_env() -> Self {
        let dir = std::env::var(config::TEMPLATES_DIR_ENV)
            .unwrap_or_else(|_| config::DEFAULT_TEMPLATES_DIR.to_string());
        Self::new(dir)
    }

    /// Resolves a template: the requested name, then the stock template,
    /// then the built-in document. Never fails; a broken template file is
    /// logged and skipped.
    pub fn load(&self, name: Option<&str>) -> ClashDocument {
        let requested = name.unwrap_or(DEFAULT_TEMPLATE);

        if plain_file_name(requested) {
            if let Some(doc) = self.read_document(requested) {
                return doc;
            }
        } else {
            warn!(template = requested, "refusing template name with path components");
        }

        if requested != DEFAULT_TEMPLATE {
            if let Some(doc) = self.read_document(DEFAULT_TEMPLATE) {
                return doc;
            }
        }

        built_in_document()
    }

    fn read_document(&self, file_name: &str) -> Option<ClashDocument> {
        let path = self.dir.join(file_name);
        let text = fs::read_to_string(&path).ok()?;
        match serde_yaml::from_str(&text) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(template = %path.display(), error = %err, "failed to parse rules template");
                None
            }
        }
    }
}

fn plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

/// Minimal serviceable document used when no template file is readable.
fn built_in_document() -> ClashDocument {
    let mut dns = Mapping::new();
    dns.insert(Value::from("enable"), Value::from(true));
    dns.insert(Value::from("enhanced-mode"), Value::from("fake-ip"));
    dns.insert(
        Value::from("nameserver"),
        Value::from(vec![Value::from("119.29.29.29")]),
    );

    let mut extra = Mapping::new();
    extra.insert(Value::from("port"), Value::from(7890));
    extra.insert(Value::from("socks-port"), Value::from(7891));
    extra.insert(Value::from("mode"), Value::from("rule"));
    extra.insert(Value::from("dns"), Value::Mapping(dns));

    ClashDocument {
        extra,
        proxies: Vec::new(),
        proxy_groups: vec![ProxyGroup {
            name: DEFAULT_SELECT_GROUP.to_string(),
            group_type: "select".to_string(),
            proxies: Vec::new(),
            extra: Mapping::new(),
        }],
        rules: vec![format!("MATCH,{DEFAULT_SELECT_GROUP}")],
    }
}
