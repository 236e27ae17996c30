// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::{DEFAULT_STABLE_SECRET_PATH, STABLE_SECRET_PATH_ENV},
    models::{ChainSpec, Node, NodePatch, Subscription, SubscriptionPatch},
    state::AppState,
};

pub mod guest;
pub mod health;
pub mod nodes;
pub mod sub;
pub mod subscriptions;

/// Path segment of the legacy shared document. Kept configurable so
/// deployments that never rotated the original secret keep their URLs.
fn stable_secret_path() -> String {
    std::env::var(STABLE_SECRET_PATH_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_STABLE_SECRET_PATH.to_string())
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/nodes",
            get(nodes::list_nodes)
                .post(nodes::create_node)
                .put(nodes::update_node)
                .delete(nodes::delete_node),
        )
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions)
                .post(subscriptions::create_subscription)
                .put(subscriptions::update_subscription)
                .delete(subscriptions::delete_subscription),
        )
        .route(
            "/subscriptions/reset",
            post(subscriptions::reset_subscription),
        )
        .route(
            "/subscriptions/extend",
            post(subscriptions::extend_subscription),
        )
        .route("/guest-pass", post(guest::create_guest_pass));

    Router::new()
        .nest("/api", api_routes)
        .route("/sub/{token}", get(sub::serve_subscription))
        .route(
            &format!("/{}", stable_secret_path()),
            get(sub::serve_stable_document),
        )
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        nodes::list_nodes,
        nodes::create_node,
        nodes::update_node,
        nodes::delete_node,
        subscriptions::list_subscriptions,
        subscriptions::create_subscription,
        subscriptions::update_subscription,
        subscriptions::delete_subscription,
        subscriptions::reset_subscription,
        subscriptions::extend_subscription,
        guest::create_guest_pass,
        sub::serve_subscription,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Node,
            NodePatch,
            Subscription,
            SubscriptionPatch,
            ChainSpec,
            nodes::CreateNodeRequest,
            subscriptions::CreateSubscriptionRequest,
            subscriptions::ResetRequest,
            subscriptions::ExtendRequest,
            subscriptions::ExtendResponse,
            guest::GuestPassRequest,
            guest::GuestPassResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Nodes", description = "Managed proxy endpoint registry"),
        (name = "Subscriptions", description = "Token-addressed subscription management"),
        (name = "Subscription document", description = "Rendered Clash documents"),
        (name = "Health", description = "Service health probes")
    )
)]
struct ApiDoc;
