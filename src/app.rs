use crate::auth::{self, AUTH_COOKIE, SESSION_TTL_SECS};
use crate::brevo::{BrevoClient, ContactsApi};
use crate::models::{LoginRequest, WaitlistRequest};
use crate::ratelimit::RateLimiter;
use crate::validate::is_valid_email;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use constant_time_eq::constant_time_eq;
use serde_json::{json, Map, Value};
use std::{env, net::SocketAddr, sync::Arc};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 16 * 1024; // signup payloads are tiny
const WAITLIST_LIMIT: u32 = 5;
const WAITLIST_WINDOW_MS: i64 = 15 * 60 * 1000;
const COUNTER_LIMIT: u32 = 30;
const COUNTER_WINDOW_MS: i64 = 60 * 1000;
const COUNTER_CACHE_CONTROL: &str = "public, s-maxage=300, stale-while-revalidate=60";

#[derive(Clone)]
pub struct AppState {
    pub contacts: Arc<dyn ContactsApi>,
    pub limiter: Arc<RateLimiter>,
    pub session_secret: String,
    pub gate_username: String,
    pub gate_password: String,
}

pub async fn run_server() -> Result<()> {
    let contacts: Arc<dyn ContactsApi> = Arc::new(BrevoClient::from_env()?);
    let session_secret = env::var("SESSION_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("SESSION_SECRET must be set"))?;
    let gate_username = env::var("GATE_USERNAME").context("GATE_USERNAME not set")?;
    let gate_password = env::var("GATE_PASSWORD").context("GATE_PASSWORD not set")?;

    let state = AppState {
        contacts,
        limiter: Arc::new(RateLimiter::new()),
        session_secret,
        gate_username,
        gate_password,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8787));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/waitlist", post(handle_waitlist))
        .route("/api/counter", get(handle_counter))
        .route("/api/login", post(handle_login))
        .route("/api/session", get(handle_session))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_waitlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: WaitlistRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejecting signup: invalid JSON body: {}", e);
            return reject(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    // Bots fill the decoy field; answer exactly like a real success so the
    // rejection is undetectable, and skip the rate limiter so automated
    // traffic never eats a real user's budget.
    if request.website.as_deref().is_some_and(|v| !v.is_empty()) {
        info!("Honeypot field populated, absorbing automated submission");
        return success();
    }

    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_lowercase();
    if !is_valid_email(&email) {
        return reject(StatusCode::BAD_REQUEST, "Invalid email address");
    }

    let ip = extract_ip(&headers);
    if !state
        .limiter
        .check_and_consume(&format!("waitlist:{ip}"), WAITLIST_LIMIT, WAITLIST_WINDOW_MS)
        .await
    {
        warn!("Signup rate limit exceeded for {}", ip);
        return reject(StatusCode::TOO_MANY_REQUESTS, "Too many requests");
    }

    match state
        .contacts
        .upsert_contact(&email, utm_attributes(&request))
        .await
    {
        Ok(()) => {
            info!("Signup synced to contact list");
            success()
        }
        Err(e) => {
            // Full detail stays in the logs; the client only ever sees the
            // generic message.
            error!("Contact sync failed: {}", e);
            reject(StatusCode::BAD_GATEWAY, "Service temporarily unavailable")
        }
    }
}

/// Attributes bag from the UTM fields that were actually sent. Absent or
/// blank fields are omitted, never forwarded as empty strings.
fn utm_attributes(request: &WaitlistRequest) -> Map<String, Value> {
    let mut attributes = Map::new();
    let pairs = [
        ("UTM_SOURCE", &request.utm_source),
        ("UTM_MEDIUM", &request.utm_medium),
        ("UTM_CAMPAIGN", &request.utm_campaign),
    ];
    for (key, value) in pairs {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            attributes.insert(key.to_string(), Value::String(v.to_string()));
        }
    }
    attributes
}

async fn handle_counter(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ip = extract_ip(&headers);
    if !state
        .limiter
        .check_and_consume(&format!("counter:{ip}"), COUNTER_LIMIT, COUNTER_WINDOW_MS)
        .await
    {
        warn!("Counter rate limit exceeded for {}", ip);
        return reject(StatusCode::TOO_MANY_REQUESTS, "Too many requests");
    }

    match state.contacts.read_list_size().await {
        Ok(count) => (
            [(header::CACHE_CONTROL, COUNTER_CACHE_CONTROL)],
            Json(json!({"success": true, "count": count})),
        )
            .into_response(),
        Err(e) => {
            // The counter is decorative; degrade to "no data" instead of
            // surfacing a provider failure.
            warn!("Counter read failed, degrading to null: {}", e);
            Json(json!({"success": true, "count": null})).into_response()
        }
    }
}

async fn handle_login(State(state): State<AppState>, body: Bytes) -> Response {
    let request: LoginRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejecting login: invalid JSON body: {}", e);
            return reject(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let user_ok = constant_time_eq(
        request.username.as_bytes(),
        state.gate_username.as_bytes(),
    );
    let pass_ok = constant_time_eq(
        request.password.as_bytes(),
        state.gate_password.as_bytes(),
    );
    // Single generic response either way; no username enumeration.
    if !(user_ok & pass_ok) {
        warn!("Login rejected: invalid credentials");
        return reject(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    let Some(token) = auth::issue_token(&state.session_secret, Utc::now()) else {
        error!("Failed to sign session token");
        return reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Service temporarily unavailable",
        );
    };
    let cookie = format!(
        "{AUTH_COOKIE}={token}; HttpOnly; Secure; SameSite=Lax; Max-Age={SESSION_TTL_SECS}; Path=/"
    );
    info!("Session issued");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({"success": true})),
    )
        .into_response()
}

async fn handle_session(State(state): State<AppState>, jar: CookieJar) -> Response {
    let authenticated = jar
        .get(AUTH_COOKIE)
        .map(|c| auth::verify_token(&state.session_secret, c.value(), Utc::now()))
        .unwrap_or(false);
    if authenticated {
        success()
    } else {
        reject(StatusCode::UNAUTHORIZED, "Not authenticated")
    }
}

fn success() -> Response {
    Json(json!({"success": true})).into_response()
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": message}))).into_response()
}

/// Client key for rate limiting: first hop of x-forwarded-for. Requests
/// without the header all share the "unknown" bucket.
fn extract_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
