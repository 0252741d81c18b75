mod acl;
pub mod auth;
mod chores;
mod config;
pub mod events;
mod family;

use crate::server::auth::AuthCtx;
use crate::storage::{StorageError, Store};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    http::{Method, StatusCode, header},
    routing::{delete, get, post},
};
use chorescore_shared::api::{self, ErrorBody};
use chorescore_shared::validation::ValidationError;
pub use config::{AppConfig, ConfigError};
pub use events::EventBus;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::field::display;
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub events: EventBus,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        Self {
            config,
            store,
            events: EventBus::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelled on shutdown; long-lived streams end with it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let family = Router::new()
        .route(
            "/api/v1/family/{family_id}/members",
            get(chores::list_members),
        )
        .route(
            "/api/v1/family/{family_id}/chores",
            get(chores::list_chores).post(chores::create_chore),
        )
        .route(
            "/api/v1/family/{family_id}/chores/board",
            get(chores::chore_board),
        )
        .route(
            "/api/v1/family/{family_id}/chores/{chore_id}",
            delete(chores::delete_chore),
        )
        .route(
            "/api/v1/family/{family_id}/chores/{chore_id}/complete",
            post(chores::complete_chore),
        )
        .route(
            "/api/v1/family/{family_id}/chores/{chore_id}/approve",
            post(chores::approve_chore),
        )
        .route(
            "/api/v1/family/{family_id}/chores/{chore_id}/reject",
            post(chores::reject_chore),
        )
        .route(
            "/api/v1/family/{family_id}/leaderboard",
            get(chores::leaderboard),
        )
        .route(
            "/api/v1/family/{family_id}/points/{user_id}",
            get(chores::user_points),
        )
        .with_state(state.clone())
        .route_layer(middleware::from_fn(set_auth_span_fields))
        .route_layer(middleware::from_fn(acl::enforce_acl))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let account = Router::new()
        .route("/api/v1/auth/renew", post(auth::renew))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/me", get(family::me).patch(family::update_me))
        .route("/api/v1/families", post(family::create_family))
        .route("/api/v1/families/join", post(family::join_family))
        .with_state(state.clone())
        .route_layer(middleware::from_fn(set_auth_span_fields))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            profile_id = tracing::field::Empty,
            role = tracing::field::Empty,
            family_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/version", get(version))
        .route("/api/v1/auth/signup", post(auth::signup))
        .route("/api/v1/auth/login", post(auth::login))
        // Authenticated through the query string; EventSource cannot send headers.
        .route(
            "/api/v1/family/{family_id}/events",
            get(events::family_events),
        )
        .merge(account)
        .merge(family)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn version() -> Json<api::VersionInfoDto> {
    Json(api::VersionInfoDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("profile_id", display(&auth.claims.sub));
        span.record("role", display(auth.claims.role));
        if let Some(fid) = &auth.claims.family_id {
            span.record("family_id", display(fid));
        }
    }
    Ok(next.run(req).await)
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Unconfirmed,
    Forbidden,
    NotFound(String),
    InvalidInviteCode,
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Transition(e) => AppError::Conflict(e.to_string()),
            StorageError::Conflict(m) => AppError::Conflict(m),
            StorageError::NotFound(what) => AppError::not_found(format!("{what} not found")),
            StorageError::InvalidInviteCode => AppError::InvalidInviteCode,
            StorageError::NotAssignee => AppError::forbidden(),
            StorageError::InvalidInput(m) => AppError::Internal(m),
            other => AppError::internal(other),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Unconfirmed => (
                StatusCode::FORBIDDEN,
                "email not confirmed".into(),
                "email_not_confirmed",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::InvalidInviteCode => (
                StatusCode::NOT_FOUND,
                "invalid invite code".into(),
                "invalid_invite_code",
                None,
            ),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(
                status = %status,
                kind = kind,
                message = %msg,
                detail = %detail,
                "request failed"
            );
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = Json(ErrorBody {
            error: msg,
            kind: kind.to_string(),
        });
        (status, body).into_response()
    }
}
