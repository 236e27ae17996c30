// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::ApiError,
    links,
    models::{Node, NodePatch},
    state::AppState,
    storage::NodeSelector,
    traffic,
};

/// Placeholder name for nodes added without one, matching the dashboard's
/// default label.
const DEFAULT_NODE_NAME: &str = "新节点";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNodeRequest {
    /// Proxy link or upstream subscription URL.
    pub url: Option<String>,
    /// Display name; defaults to the parsed link name, else a placeholder.
    pub name: Option<String>,
    #[serde(default)]
    pub limit_gb: f64,
    #[serde(default, with = "crate::models::lenient_date")]
    pub expiry: Option<NaiveDate>,
    pub chain_with: Option<String>,
}

/// Addresses a node positionally or by stable id; `id` wins when both are
/// present.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NodeSelectorQuery {
    /// Zero-based position in the node list.
    pub index: Option<String>,
    /// Stable node id.
    pub id: Option<String>,
}

fn parse_selector(query: &NodeSelectorQuery) -> Result<NodeSelector, ApiError> {
    if let Some(id) = query.id.as_deref().filter(|s| !s.is_empty()) {
        return Ok(NodeSelector::Id(id.to_string()));
    }
    let raw = query
        .index
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Missing index or id"))?;
    let index = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| ApiError::bad_request("Invalid index"))?;
    Ok(NodeSelector::Index(index))
}

#[utoipa::path(
    get,
    path = "/api/nodes",
    tag = "Nodes",
    responses((status = 200, body = [Node]))
)]
pub async fn list_nodes(State(state): State<AppState>) -> Result<Json<Vec<Node>>, ApiError> {
    let mut registry = state.store.load()?;
    // Counters are refreshed for display only; nothing is persisted here.
    traffic::refresh(&mut registry.nodes, state.traffic.as_ref());
    Ok(Json(registry.nodes))
}

#[utoipa::path(
    post,
    path = "/api/nodes",
    request_body = CreateNodeRequest,
    tag = "Nodes",
    responses(
        (status = 201, body = Node),
        (status = 400, description = "Missing URL")
    )
)]
pub async fn create_node(
    State(state): State<AppState>,
    Json(request): Json<CreateNodeRequest>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let url = request
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing URL"))?
        .to_string();

    let name = request
        .name
        .filter(|n| !n.is_empty())
        .or_else(|| {
            links::parse(&url)
                .ok()
                .map(|p| p.name().to_string())
                .filter(|n| !n.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string());

    let node = Node {
        id: Uuid::new_v4().to_string(),
        name,
        url,
        limit_gb: request.limit_gb,
        used_bytes: 0,
        expiry: request.expiry,
        chain_with: request.chain_with,
    };
    let created = state.store.add_node(node).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/api/nodes",
    params(NodeSelectorQuery),
    request_body = NodePatch,
    tag = "Nodes",
    responses(
        (status = 200, body = Node),
        (status = 400, description = "Invalid index"),
        (status = 404, description = "Node not found")
    )
)]
pub async fn update_node(
    State(state): State<AppState>,
    Query(query): Query<NodeSelectorQuery>,
    Json(patch): Json<NodePatch>,
) -> Result<Json<Node>, ApiError> {
    let selector = parse_selector(&query)?;
    let node = state.store.update_node(selector, patch).await?;
    Ok(Json(node))
}

#[utoipa::path(
    delete,
    path = "/api/nodes",
    params(NodeSelectorQuery),
    tag = "Nodes",
    responses(
        (status = 204),
        (status = 400, description = "Invalid index"),
        (status = 404, description = "Node not found")
    )
)]
pub async fn delete_node(
    State(state): State<AppState>,
    Query(query): Query<NodeSelectorQuery>,
) -> Result<StatusCode, ApiError> {
    let selector = parse_selector(&query)?;
    state.store.remove_node(selector).await?;
    Ok(StatusCode::NO_CONTENT)
}
