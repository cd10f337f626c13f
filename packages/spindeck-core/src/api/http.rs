//! HTTP route handlers.
//!
//! The HTTP surface is deliberately thin: a health probe and the WebSocket
//! upgrade. Everything stateful lives behind the engine.

use axum::http::{HeaderValue, Method};
use axum::routing::{any, get};
use axum::{extract::State, Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::protocol_constants::SERVICE_ID;

/// Health endpoint body.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub rooms: usize,
    pub clients: usize,
    pub persistence: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.engine.stats();
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_ID,
        version: env!("CARGO_PKG_VERSION"),
        rooms: stats.rooms,
        clients: state.ws_manager.connection_count(),
        persistence: state.engine.persistence_label(),
    })
}

/// Expands configured origins with and without a `www.` prefix so deploys
/// don't have to list both spellings.
pub(crate) fn expand_origins(origins: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for origin in origins {
        let origin = origin.trim_end_matches('/').to_string();
        if !expanded.contains(&origin) {
            expanded.push(origin.clone());
        }
        let variant = match origin.split_once("://") {
            Some((scheme, rest)) => match rest.strip_prefix("www.") {
                Some(bare) => format!("{scheme}://{bare}"),
                None => format!("{scheme}://www.{rest}"),
            },
            None => continue,
        };
        if !expanded.contains(&variant) {
            expanded.push(variant);
        }
    }
    expanded
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let list: Vec<HeaderValue> = expand_origins(origins)
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(list))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Builds the router with health, WebSocket, CORS and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.api.cors_origins);
    Router::new()
        .route("/health", get(health))
        .route("/ws", any(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_origins_adds_www_variants() {
        let origins = vec!["https://spindeck.app".to_string()];
        let expanded = expand_origins(&origins);
        assert!(expanded.contains(&"https://spindeck.app".to_string()));
        assert!(expanded.contains(&"https://www.spindeck.app".to_string()));
    }

    #[test]
    fn expand_origins_strips_www_variants() {
        let origins = vec!["https://www.spindeck.app/".to_string()];
        let expanded = expand_origins(&origins);
        assert!(expanded.contains(&"https://www.spindeck.app".to_string()));
        assert!(expanded.contains(&"https://spindeck.app".to_string()));
    }

    #[test]
    fn expand_origins_deduplicates() {
        let origins = vec![
            "https://spindeck.app".to_string(),
            "https://www.spindeck.app".to_string(),
        ];
        assert_eq!(expand_origins(&origins).len(), 2);
    }

    #[test]
    fn expand_origins_skips_schemeless_entries() {
        let origins = vec!["localhost:3000".to_string()];
        let expanded = expand_origins(&origins);
        assert_eq!(expanded, vec!["localhost:3000".to_string()]);
    }
}
