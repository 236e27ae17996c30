// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Clash Document Model
//!
//! Everything that goes into a rendered subscription document:
//!
//! - [`proxy`] - typed `proxies` / `proxy-groups` entries
//! - [`template`] - rules templates and the output document shell
//! - [`chains`] - dialer resolution and relay group construction
//! - [`synth`] - final assembly and the usage header

pub mod chains;
pub mod proxy;
pub mod synth;
pub mod template;

pub use proxy::{Proxy, ProxyGroup, ResolvedNode};
pub use synth::{synthesize, SynthError, Synthesis, UserInfo};
pub use template::{ClashDocument, TemplateStore};
