// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use super::subscriptions::generate_token;
use crate::{error::ApiError, models::Subscription, state::AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct GuestPassRequest {
    #[serde(default)]
    pub node_ids: Vec<String>,
    /// Lifetime of the pass, from now.
    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
    #[serde(default)]
    pub limit_gb: f64,
    /// Output format; only `clash` is supported.
    #[serde(default = "default_format")]
    pub format: String,
    /// Display name; defaults to a duration-based label.
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GuestPassResponse {
    pub status: String,
    /// Token-bearing subscription URL for the guest.
    pub link: String,
    pub format: String,
    pub expiry: String,
    pub token: String,
}

fn default_duration_hours() -> f64 {
    0.5
}

fn default_format() -> String {
    "clash".to_string()
}

/// Mints a throwaway subscription over the selected nodes, time-boxed and
/// quota-boxed, and returns the URL to hand to the guest.
#[utoipa::path(
    post,
    path = "/api/guest-pass",
    request_body = GuestPassRequest,
    tag = "Subscriptions",
    responses(
        (status = 201, body = GuestPassResponse),
        (status = 400, description = "Unsupported format")
    )
)]
pub async fn create_guest_pass(
    State(state): State<AppState>,
    Json(request): Json<GuestPassRequest>,
) -> Result<(StatusCode, Json<GuestPassResponse>), ApiError> {
    if request.format != "clash" {
        return Err(ApiError::bad_request("Only the clash format is supported"));
    }

    let now = Utc::now();
    let expiry = (now + Duration::seconds((request.duration_hours * 3600.0) as i64)).date_naive();
    let name = request
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Guest-{}h", request.duration_hours));

    let sub = Subscription {
        id: Uuid::new_v4().to_string(),
        name,
        token: generate_token(),
        node_ids: request.node_ids,
        traffic_base: HashMap::new(),
        limit_gb: request.limit_gb,
        used_bytes: 0,
        expiry: Some(expiry),
        status: "active".to_string(),
        is_guest: true,
        chains: Vec::new(),
        external_proxy: None,
        dialer_id: None,
        dialer_name: None,
        template: None,
    };
    let created = state
        .store
        .add_subscription_with_baseline(sub, state.traffic.as_ref())
        .await?;

    let link = format!(
        "http://{}:{}/sub/{}",
        state.fetcher.public_ip(),
        state.port,
        created.token
    );
    Ok((
        StatusCode::CREATED,
        Json(GuestPassResponse {
            status: "ok".to_string(),
            link,
            format: "clash".to_string(),
            expiry: expiry.format("%Y-%m-%d").to_string(),
            token: created.token,
        }),
    ))
}
