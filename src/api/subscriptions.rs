// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{ChainSpec, Subscription, SubscriptionPatch},
    state::AppState,
    traffic,
};

/// Placeholder name for subscriptions created without one.
const DEFAULT_SUBSCRIPTION_NAME: &str = "未命名订阅";

const TOKEN_LEN: usize = 16;

/// Fresh capability token. Knowing it is the only credential a subscriber
/// needs, so it comes from the thread-local CSPRNG.
pub(super) fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn require_id(id: Option<&str>) -> Result<&str, ApiError> {
    id.filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing id"))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    /// Display name; defaults to an unnamed-subscription placeholder.
    pub name: Option<String>,
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub limit_gb: f64,
    #[serde(default, with = "crate::models::lenient_date")]
    pub expiry: Option<NaiveDate>,
    /// Single legacy relay hop.
    pub external_proxy: Option<ChainSpec>,
    /// Ordered relay hops, outermost first.
    #[serde(default)]
    pub chains: Vec<ChainSpec>,
    /// Subscription-level dialer selection by node id.
    pub dialer_id: Option<String>,
    /// Subscription-level dialer selection by node-name substring.
    pub dialer_name: Option<String>,
    /// Rules template file name.
    pub template: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SubscriptionIdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResetRequest {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtendRequest {
    pub id: Option<String>,
    /// Hours to push the expiry out by, counted from the current expiry or
    /// from now, whichever is later.
    #[serde(default = "default_extend_hours")]
    pub extend_hours: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtendResponse {
    pub status: String,
    pub new_expiry: String,
}

fn default_extend_hours() -> f64 {
    24.0
}

#[utoipa::path(
    get,
    path = "/api/subscriptions",
    tag = "Subscriptions",
    responses((status = 200, body = [Subscription]))
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let mut registry = state.store.load()?;
    traffic::refresh(&mut registry.nodes, state.traffic.as_ref());
    let nodes = registry.nodes;
    let mut subs = registry.subscriptions;
    // Live figures for the dashboard; the stored documents keep their
    // last persisted counters.
    for sub in &mut subs {
        sub.used_bytes = traffic::subscription_usage(sub, &nodes);
    }
    Ok(Json(subs))
}

#[utoipa::path(
    post,
    path = "/api/subscriptions",
    request_body = CreateSubscriptionRequest,
    tag = "Subscriptions",
    responses((status = 201, body = Subscription))
)]
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let sub = Subscription {
        id: Uuid::new_v4().to_string(),
        name: request
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_NAME.to_string()),
        token: generate_token(),
        node_ids: request.node_ids,
        traffic_base: HashMap::new(),
        limit_gb: request.limit_gb,
        used_bytes: 0,
        expiry: request.expiry,
        status: "active".to_string(),
        is_guest: false,
        chains: request.chains,
        external_proxy: request.external_proxy,
        dialer_id: request.dialer_id,
        dialer_name: request.dialer_name,
        template: request.template,
    };
    let created = state
        .store
        .add_subscription_with_baseline(sub, state.traffic.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/api/subscriptions",
    params(SubscriptionIdQuery),
    request_body = SubscriptionPatch,
    tag = "Subscriptions",
    responses(
        (status = 200, body = Subscription),
        (status = 404, description = "Subscription not found")
    )
)]
pub async fn update_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionIdQuery>,
    Json(patch): Json<SubscriptionPatch>,
) -> Result<Json<Subscription>, ApiError> {
    let id = require_id(query.id.as_deref())?;
    let sub = state.store.update_subscription(id, patch).await?;
    Ok(Json(sub))
}

#[utoipa::path(
    delete,
    path = "/api/subscriptions",
    params(SubscriptionIdQuery),
    tag = "Subscriptions",
    responses(
        (status = 204),
        (status = 404, description = "Subscription not found")
    )
)]
pub async fn delete_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionIdQuery>,
) -> Result<StatusCode, ApiError> {
    let id = require_id(query.id.as_deref())?;
    state.store.remove_subscription(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rebases the subscription's traffic accounting on the current counters.
/// The id arrives as a query parameter or a JSON body, whichever the
/// dashboard sends.
#[utoipa::path(
    post,
    path = "/api/subscriptions/reset",
    params(SubscriptionIdQuery),
    request_body = ResetRequest,
    tag = "Subscriptions",
    responses(
        (status = 200, body = Subscription),
        (status = 404, description = "Subscription not found")
    )
)]
pub async fn reset_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionIdQuery>,
    body: Bytes,
) -> Result<Json<Subscription>, ApiError> {
    let body_id = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<ResetRequest>(&body)
            .map_err(|_| ApiError::bad_request("Invalid JSON body"))?
            .id
    };
    let id = query
        .id
        .filter(|s| !s.is_empty())
        .or(body_id)
        .ok_or_else(|| ApiError::bad_request("Missing id"))?;

    let sub = state
        .store
        .reset_subscription_baseline(&id, state.traffic.as_ref())
        .await?;
    Ok(Json(sub))
}

#[utoipa::path(
    post,
    path = "/api/subscriptions/extend",
    request_body = ExtendRequest,
    tag = "Subscriptions",
    responses(
        (status = 200, body = ExtendResponse),
        (status = 404, description = "Subscription not found")
    )
)]
pub async fn extend_subscription(
    State(state): State<AppState>,
    Json(request): Json<ExtendRequest>,
) -> Result<Json<ExtendResponse>, ApiError> {
    let id = require_id(request.id.as_deref())?.to_string();
    let sub = state
        .store
        .extend_subscription_expiry(&id, request.extend_hours, Utc::now())
        .await?;
    let new_expiry = sub
        .expiry
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    Ok(Json(ExtendResponse {
        status: "ok".to_string(),
        new_expiry,
    }))
}
