use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use crate::errors::ProbeError;
use crate::models::{parse_tracking_id, CallbackEvent};
use crate::payloads::Corpus;
use super::hits::{Admission, HitLedger};

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub host: String,
    pub port: u16,
    /// Scheme clients reach this listener with, when no proxy says otherwise.
    pub scheme: String,
    /// Plain-HTTP port that redirects to HTTPS, if any.
    pub redirect_port: Option<u16>,
    pub result_file: PathBuf,
    pub max_hits: Option<u32>,
}

/// Shared by every request handler. The corpus is read-only; the ledger
/// does its own locking.
#[derive(Clone)]
pub struct ListenerState {
    pub ledger: Arc<HitLedger>,
    pub corpus: Arc<Corpus>,
    pub scheme: String,
}

impl ListenerState {
    pub fn new(ledger: HitLedger, corpus: Corpus, scheme: &str) -> Self {
        Self {
            ledger: Arc::new(ledger),
            corpus: Arc::new(corpus),
            scheme: scheme.to_ascii_uppercase(),
        }
    }
}

/// Every path and method lands on one handler.
pub fn build_router(state: ListenerState) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Router for the plain-HTTP side of dual-protocol mode.
pub fn build_redirect_router() -> Router {
    Router::new()
        .fallback(redirect_to_https)
        .layer(TraceLayer::new_for_http())
}

const CORS_ANY: (header::HeaderName, &str) = (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");

async fn handle_request(State(state): State<ListenerState>, request: Request) -> Response {
    if request.method() == Method::OPTIONS {
        return (
            StatusCode::OK,
            [
                CORS_ANY,
                (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
                (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            ],
        )
            .into_response();
    }

    if let Some(event) = callback_event(&state, &request) {
        record_hit(&state, event).await;
    } else {
        debug!(method = %request.method(), path = %request.uri().path(), "Request without tracking id");
    }

    if request.method() == Method::POST {
        (
            StatusCode::OK,
            [CORS_ANY, (header::CONTENT_TYPE, "application/json")],
            r#"{"status":"ok"}"#,
        )
            .into_response()
    } else {
        (
            StatusCode::OK,
            [CORS_ANY, (header::CONTENT_TYPE, "application/javascript")],
            "// ok",
        )
            .into_response()
    }
}

/// First `id` query parameter, if it is a positive integer.
pub fn tracking_id(query: Option<&str>) -> Option<u64> {
    query?
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == "id")
        .and_then(|(_, value)| {
            let decoded = urlencoding::decode(value).ok()?;
            parse_tracking_id(&decoded)
        })
}

fn header_or(headers: &HeaderMap, name: header::HeaderName, fallback: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn callback_event(state: &ListenerState, request: &Request<Body>) -> Option<CallbackEvent> {
    let position = tracking_id(request.uri().query())?;
    let headers = request.headers();
    let source_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let protocol = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|p| p.to_ascii_uppercase())
        .unwrap_or_else(|| state.scheme.clone());

    Some(CallbackEvent {
        position,
        source_ip,
        protocol,
        referer: header_or(headers, header::REFERER, "Direct"),
        user_agent: header_or(headers, header::USER_AGENT, "Unknown"),
        timestamp: Utc::now(),
        raw_path: request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
    })
}

async fn record_hit(state: &ListenerState, event: CallbackEvent) {
    let admission = state.ledger.admit(event.position);
    if admission == Admission::Suppressed {
        debug!(position = event.position, "Hit cap reached, not recorded");
        return;
    }

    let payload = state.corpus.get(event.position).map(|r| r.raw.as_str());
    match admission {
        Admission::Counted { hit, max } if admission.confirms() => {
            info!(position = event.position, ip = %event.source_ip, hit, max, "Payload confirmed, further hits suppressed");
        }
        Admission::Counted { hit, max } => {
            info!(position = event.position, ip = %event.source_ip, hit, max, "XSS payload hit");
        }
        _ => {
            info!(
                position = event.position,
                ip = %event.source_ip,
                protocol = %event.protocol,
                referer = %event.referer,
                path = %event.raw_path,
                "XSS payload hit"
            );
        }
    }
    if payload.is_none() {
        warn!(position = event.position, "Hit for a position outside the corpus");
    }

    if let Err(e) = state.ledger.persist(&event, payload, admission).await {
        warn!(position = event.position, error = %e, "Could not persist hit");
    }
}

async fn redirect_to_https(headers: HeaderMap, request: Request) -> Response {
    let host = header_or(&headers, header::HOST, "localhost");
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, format!("https://{}{}", host, path))],
    )
        .into_response()
}

/// Run the listener (and the redirect listener, if configured) until
/// `shutdown` fires, then sort the persisted hits.
pub async fn serve(settings: &ListenerSettings, state: ListenerState, shutdown: CancellationToken) -> Result<(), ProbeError> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ProbeError::Config(format!("Cannot bind {}: {}", addr, e)))?;
    info!(%addr, scheme = %settings.scheme, "Callback listener up");

    let redirect = match settings.redirect_port {
        Some(port) => {
            let raddr = format!("{}:{}", settings.host, port);
            let rlistener = tokio::net::TcpListener::bind(&raddr)
                .await
                .map_err(|e| ProbeError::Config(format!("Cannot bind {}: {}", raddr, e)))?;
            info!(addr = %raddr, "HTTP to HTTPS redirect listener up");
            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                axum::serve(rlistener, build_redirect_router())
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
            }))
        }
        None => None,
    };

    let ledger = Arc::clone(&state.ledger);
    let app = build_router(state);
    let token = shutdown.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .map_err(|e| ProbeError::Internal(format!("Listener error: {}", e)))?;

    if let Some(handle) = redirect {
        match handle.await {
            Ok(Err(e)) => warn!(error = %e, "Redirect listener error"),
            Err(e) => warn!(error = %e, "Redirect listener task failed"),
            Ok(Ok(())) => {}
        }
    }

    ledger.finalize().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_id_from_query() {
        assert_eq!(tracking_id(Some("id=42")), Some(42));
        assert_eq!(tracking_id(Some("x=1&id=7&id=9")), Some(7));
        assert_eq!(tracking_id(Some("id=abc")), None);
        assert_eq!(tracking_id(Some("id")), None);
        assert_eq!(tracking_id(Some("ids=3")), None);
        assert_eq!(tracking_id(None), None);
    }
}
