//! Sketchroom Auth Relay Server
//!
//! A small HTTP relay that exchanges room credentials for realtime-channel
//! tokens. Clients never see the hosted room service's key; they POST
//! `{roomId, userId, userName, userRole}` here and get back `{token}`.
//!
//! ## Endpoints
//!
//! ```text
//! POST /api/room-token   -> 200 {"token": "..."} | 4xx/5xx {"error": "..."}
//! GET  /health           -> 200 {"ok": bool, "realtime": bool, "auth": bool}
//! ```

mod rate_limit;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use rate_limit::RateLimiter;

const DEFAULT_PORT: u16 = 3030;
const DOWNSTREAM_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared application state
struct AppState {
    http: reqwest::Client,
    limiter: RateLimiter,
    /// Base URL of the hosted room service; `None` disables the relay.
    service_url: Option<String>,
    /// Server-held service key, never forwarded to clients.
    service_key: Option<String>,
}

impl AppState {
    fn from_env() -> Self {
        let service_url = std::env::var("ROOM_SERVICE_URL").ok().filter(|v| !v.is_empty());
        let service_key = std::env::var("ROOM_SERVICE_KEY").ok().filter(|v| !v.is_empty());
        if service_url.is_none() || service_key.is_none() {
            warn!("ROOM_SERVICE_URL/ROOM_SERVICE_KEY not set; token relay disabled");
        }
        Self {
            http: reqwest::Client::builder()
                .timeout(DOWNSTREAM_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            limiter: RateLimiter::new(),
            service_url,
            service_key,
        }
    }

    fn configured(&self) -> bool {
        self.service_url.is_some() && self.service_key.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest {
    room_id: String,
    user_id: String,
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    user_role: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchroom_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::from_env());

    let app = Router::new()
        .route("/", get(index))
        .route("/api/room-token", post(room_token))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Sketchroom auth relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Index page
async fn index() -> &'static str {
    "Sketchroom Auth Relay - POST /api/room-token"
}

/// Exchange room credentials for a realtime-channel token.
async fn room_token(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<TokenRequest>,
) -> impl IntoResponse {
    if let Err(e) = state.limiter.check_and_record(addr.ip()) {
        warn!("rate limited {}: {}", addr.ip(), e);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": e.to_string() })),
        );
    }

    if req.room_id.trim().is_empty() || req.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "roomId and userId are required" })),
        );
    }

    let (Some(url), Some(key)) = (&state.service_url, &state.service_key) else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "room service not configured" })),
        );
    };

    let upstream = state
        .http
        .post(format!("{}/token", url.trim_end_matches('/')))
        .bearer_auth(key)
        .json(&serde_json::json!({
            "roomId": req.room_id,
            "userId": req.user_id,
            "userName": req.user_name,
            "userRole": req.user_role,
        }))
        .send()
        .await;

    match upstream {
        Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
            Ok(body) => match body.get("token").and_then(|t| t.as_str()) {
                Some(token) => (
                    StatusCode::OK,
                    Json(serde_json::json!({ "token": token })),
                ),
                None => (
                    StatusCode::BAD_GATEWAY,
                    Json(serde_json::json!({ "error": "room service returned no token" })),
                ),
            },
            Err(e) => {
                warn!("room service response unreadable: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(serde_json::json!({ "error": "invalid room service response" })),
                )
            }
        },
        Ok(resp) => {
            let status = resp.status();
            warn!("room service rejected token request: {}", status);
            (
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                Json(serde_json::json!({ "error": format!("room service error ({})", status) })),
            )
        }
        Err(e) => {
            warn!("room service unreachable: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "room service unreachable" })),
            )
        }
    }
}

/// Health check reporting downstream availability.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let realtime = match &state.service_url {
        Some(url) => state
            .http
            .get(url.as_str())
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await
            .is_ok(),
        None => false,
    };
    let auth = state.configured();
    Json(serde_json::json!({
        "ok": realtime && auth,
        "realtime": realtime,
        "auth": auth,
    }))
}
