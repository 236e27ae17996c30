// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The subscriber-facing document endpoints: `/sub/{token}` and the
//! stable secret path. Everything the registry knows converges here:
//! counters are refreshed, the gate runs, upstream bodies are resolved,
//! and the Clash document is synthesized per request.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::info;

use crate::{
    clash::{synthesize, Synthesis},
    error::ApiError,
    gate,
    state::AppState,
    traffic,
};

/// Download file name advertised to subscription clients.
const ATTACHMENT_NAME: &str = "sub_hub.yaml";

fn yaml_response(synthesis: &Synthesis) -> Result<Response, ApiError> {
    let yaml = serde_yaml::to_string(&synthesis.document)
        .map_err(|e| ApiError::internal(format!("failed to render document: {e}")))?;
    let headers = [
        (header::CONTENT_TYPE, "text/yaml; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{ATTACHMENT_NAME}\""),
        ),
        (
            HeaderName::from_static("subscription-userinfo"),
            synthesis.user_info.header_value(),
        ),
    ];
    Ok((headers, yaml).into_response())
}

/// Renders the document for one subscription token.
#[utoipa::path(
    get,
    path = "/sub/{token}",
    params(("token" = String, Path, description = "Subscription capability token")),
    tag = "Subscription document",
    responses(
        (status = 200, description = "Clash YAML document", content_type = "text/yaml"),
        (status = 403, description = "Invalid token, expired, or over quota"),
        (status = 500, description = "No nodes available")
    )
)]
pub async fn serve_subscription(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let mut registry = state.store.load()?;
    traffic::refresh(&mut registry.nodes, state.traffic.as_ref());

    let admission = gate::evaluate(&registry, &token, Utc::now())?;
    let filter: HashSet<String> = admission.subscription.node_ids.iter().cloned().collect();
    let resolved = state.fetcher.resolve(&registry.nodes, Some(&filter)).await;

    let document = state
        .templates
        .load(admission.subscription.template.as_deref());
    let synthesis = synthesize(
        Some(&admission.subscription),
        admission.used_bytes,
        &resolved,
        &registry.nodes,
        document,
    )?;

    info!(
        subscription = %admission.subscription.name,
        proxies = resolved.len(),
        "serving subscription document"
    );
    yaml_response(&synthesis)
}

/// Renders the unfiltered document behind the stable secret path. No gate:
/// knowing the path is the credential, and the usage header aggregates the
/// node records themselves.
pub async fn serve_stable_document(State(state): State<AppState>) -> Result<Response, ApiError> {
    let mut registry = state.store.load()?;
    traffic::refresh(&mut registry.nodes, state.traffic.as_ref());

    let resolved = state.fetcher.resolve(&registry.nodes, None).await;
    let document = state.templates.load(None);
    let synthesis = synthesize(None, 0, &resolved, &registry.nodes, document)?;

    info!(proxies = resolved.len(), "serving stable document");
    yaml_response(&synthesis)
}
