// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Gate
//!
//! Decides whether a subscription token may receive a rendered document at
//! a given instant. Checks run in a fixed order and the first failure wins:
//! token lookup, calendar expiry, traffic quota. The stored expiry date is
//! inclusive: a plan dated today is served through the end of today and cut
//! off at the next midnight. Quota is exact to the byte.
//!
//! Evaluation never mutates anything. Callers refresh counters first so the
//! quota verdict is against live data, not the last persisted snapshot.

use chrono::{DateTime, Duration, Utc};

use crate::error::ApiError;
use crate::models::{expiry_start_utc, RegistryState, Subscription};
use crate::traffic::{self, GIB};

/// Why a request was turned away. All variants map to HTTP 403 with the
/// reason text as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    InvalidToken,
    Expired,
    QuotaExceeded,
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRejection::InvalidToken => write!(f, "Invalid subscription token."),
            GateRejection::Expired => write!(f, "Subscription expired."),
            GateRejection::QuotaExceeded => write!(f, "Subscription traffic limit exceeded."),
        }
    }
}

impl std::error::Error for GateRejection {}

impl From<GateRejection> for ApiError {
    fn from(rejection: GateRejection) -> Self {
        ApiError::forbidden(rejection.to_string())
    }
}

/// A granted request: the subscription (carrying the node filter) and its
/// live usage, which the synthesizer reuses for the usage header.
#[derive(Debug, Clone)]
pub struct Admission {
    pub subscription: Subscription,
    pub used_bytes: u64,
}

/// Runs the gate against an already-refreshed registry snapshot.
pub fn evaluate(
    state: &RegistryState,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Admission, GateRejection> {
    let sub = state
        .subscription_by_token(token)
        .ok_or(GateRejection::InvalidToken)?;

    if let Some(expiry) = sub.expiry {
        // The stored date is inclusive: cut off one full day after it starts.
        let cutoff = expiry_start_utc(expiry) + Duration::days(1);
        if now > cutoff {
            return Err(GateRejection::Expired);
        }
    }

    let used_bytes = traffic::subscription_usage(sub, &state.nodes);
    if sub.limit_gb > 0.0 && used_bytes as f64 >= sub.limit_gb * GIB {
        return Err(GateRejection::QuotaExceeded);
    }

    Ok(Admission {
        subscription: sub.clone(),
        used_bytes,
    })
}
