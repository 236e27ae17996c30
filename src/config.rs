// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CONFIG_PATH` | Path of the registry JSON document | `config.json` |
//! | `TEMPLATES_DIR` | Directory holding named Clash templates | `templates` |
//! | `XUI_DB_PATH` | 3x-ui SQLite database with traffic counters | `/etc/x-ui/x-ui.db` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `PUBLIC_IP` | Public address advertised in guest links; skips the probe | Probed at startup |
//! | `STABLE_SECRET_PATH` | Path segment of the legacy all-nodes subscription | `my-stable-sub` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Environment variable name for the registry document path.
///
/// The registry is a single JSON document holding every node and
/// subscription. It is rewritten atomically on each mutation, so pointing
/// this at tmpfs loses state on reboot.
///
/// # Default
/// `config.json` (relative to the working directory)
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Default registry document path when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Environment variable name for the template directory.
///
/// Subscriptions may name a template file inside this directory; unknown or
/// unset names fall back to `base-rules.yaml`, then to the built-in default.
pub const TEMPLATES_DIR_ENV: &str = "TEMPLATES_DIR";

/// Default template directory when [`TEMPLATES_DIR_ENV`] is unset.
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// Environment variable name for the 3x-ui SQLite database path.
///
/// The database is opened read-only on demand; this service never writes to
/// it. When the file is absent, traffic counters simply stop refreshing and
/// the last persisted values are served.
pub const XUI_DB_PATH_ENV: &str = "XUI_DB_PATH";

/// Default 3x-ui database path when [`XUI_DB_PATH_ENV`] is unset.
pub const DEFAULT_XUI_DB_PATH: &str = "/etc/x-ui/x-ui.db";

/// Environment variable name for the advertised public IP.
///
/// When set, the startup probe against the usual what-is-my-ip services is
/// skipped. The value is substituted for `127.0.0.1` endpoints and used in
/// guest-pass links.
pub const PUBLIC_IP_ENV: &str = "PUBLIC_IP";

/// Environment variable name for the legacy stable subscription path.
///
/// The pre-token deployment served one shared document under a secret path
/// segment; clients configured with that URL keep working.
pub const STABLE_SECRET_PATH_ENV: &str = "STABLE_SECRET_PATH";

/// Default legacy path segment when [`STABLE_SECRET_PATH_ENV`] is unset.
pub const DEFAULT_STABLE_SECRET_PATH: &str = "my-stable-sub";
