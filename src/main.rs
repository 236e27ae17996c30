// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

mod api;
mod clash;
mod config;
mod error;
mod gate;
mod links;
mod models;
mod state;
mod storage;
mod traffic;
mod upstream;

#[cfg(not(test))]
use std::{env, net::SocketAddr, sync::Arc};

#[cfg(not(test))]
use api::router;
#[cfg(not(test))]
use clash::TemplateStore;
#[cfg(not(test))]
use state::AppState;
#[cfg(not(test))]
use storage::RegistryStore;
#[cfg(not(test))]
use traffic::{TrafficSource, XuiDatabase};
#[cfg(not(test))]
use upstream::NodeFetcher;

#[cfg(not(test))]
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(not(test))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}

#[cfg(not(test))]
#[tokio::main]
async fn main() {
    init_logging();

    let store = RegistryStore::from_env();
    let templates = TemplateStore::from_env();
    let traffic: Arc<dyn TrafficSource> = Arc::new(XuiDatabase::from_env());

    // Resolved once; substituted for loopback endpoints and used in
    // guest-pass links for the whole process lifetime.
    let public_ip = upstream::detect_public_ip().await;
    let fetcher = NodeFetcher::new(public_ip).expect("Failed to build upstream HTTP client");

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    tracing::info!(
        registry = %store.path().display(),
        public_ip = %fetcher.public_ip(),
        "starting sub hub"
    );

    let state = AppState::new(store, traffic, fetcher, templates, port);
    let app = router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!("Sub Hub listening on http://{addr} (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");
}
