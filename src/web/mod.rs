//! HTTP surface: routes, status mapping and response hardening.

pub mod auth;
pub mod site;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Error;

pub use auth::BasicAuth;
pub use site::Site;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";
pub const CSS_CONTENT_TYPE: &str = "text/css; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Stylesheet of the built-in template, served from the blog's own origin.
const STYLESHEET: &str = include_str!("../../templates/style.css");

/// Headers added to every response.
pub const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    (
        "content-security-policy",
        "default-src 'none'; style-src 'self'; img-src 'self'; base-uri 'self'; \
         form-action 'none'; frame-ancestors 'none'",
    ),
    (
        "strict-transport-security",
        "max-age=63072000; includeSubDomains",
    ),
    ("referrer-policy", "no-referrer"),
    (
        "permissions-policy",
        "camera=(), microphone=(), geolocation=(), payment=()",
    ),
];

/// Build the application router.
pub fn router(site: Arc<Site>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/email/:uid", get(email))
        .route("/feed.xml", get(feed))
        .route("/style.css", get(stylesheet))
        .route("/health", get(health))
        .layer(axum::middleware::map_response(add_security_headers))
        .with_state(site)
}

/// Serve until `shutdown` is cancelled, then let in-flight requests finish.
pub async fn serve(
    listener: TcpListener,
    site: Arc<Site>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(site))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn index(State(site): State<Arc<Site>>, headers: HeaderMap) -> Response {
    respond(site.index(authorization(&headers)), HTML_CONTENT_TYPE)
}

async fn email(
    State(site): State<Arc<Site>>,
    Path(uid): Path<String>,
    headers: HeaderMap,
) -> Response {
    debug!(uid = %uid, "Email page requested");
    respond(site.email(authorization(&headers), &uid), HTML_CONTENT_TYPE)
}

async fn feed(State(site): State<Arc<Site>>, headers: HeaderMap) -> Response {
    respond(site.feed(authorization(&headers)), RSS_CONTENT_TYPE)
}

async fn stylesheet() -> Response {
    ([(header::CONTENT_TYPE, CSS_CONTENT_TYPE)], STYLESHEET).into_response()
}

async fn health() -> Response {
    ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], "OK").into_response()
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

fn respond(result: crate::error::Result<String>, content_type: &'static str) -> Response {
    match result {
        Ok(body) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound(_) => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
                "Email not found",
            )
                .into_response(),
            Error::AuthChallenge => (
                StatusCode::UNAUTHORIZED,
                [
                    (header::WWW_AUTHENTICATE, auth::challenge()),
                    (header::CONTENT_TYPE, TEXT_CONTENT_TYPE.to_string()),
                ],
                "Authentication required",
            )
                .into_response(),
            other => {
                error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
                    "Internal Server Error",
                )
                    .into_response()
            }
        }
    }
}

async fn add_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}
