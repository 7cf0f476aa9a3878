//! The tower layers every application router runs behind.
//!
//! Layers are added innermost first; the last one added sees the request
//! first. Order from the inside out:
//!
//! 1. Session manager (the pipeline reads the `Session` extension)
//! 2. Body limit
//! 3. Request tracing (`http_request` span, `user` recorded later)
//! 4. Timeout (408)
//! 5. Request id (generated, then propagated to the response)
//! 6. Panic recovery

use {
    crate::{Config, RequestIdGenerator, SessionConfig},
    axum::{Router, body::Body, extract::DefaultBodyLimit, response::Response},
    http::{HeaderName, Request, StatusCode},
    tower_http::{
        catch_panic::CatchPanicLayer,
        limit::RequestBodyLimitLayer,
        request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    },
    tower_sessions::{
        Expiry, SessionManagerLayer, SessionStore,
        cookie::{SameSite, time::Duration as CookieDuration},
    },
};

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// Cookie session layer configured from `[session]`.
pub(crate) fn session_layer<S>(store: S, config: &SessionConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    let expiry_secs = i64::try_from(config.expiry.as_secs()).unwrap_or(i64::MAX);
    SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_secure(config.secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(CookieDuration::seconds(expiry_secs)))
}

/// Wraps `router` (already carrying its session layer) in the remaining
/// layers.
pub(crate) fn apply(mut router: Router, config: &Config) -> Router {
    router = router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            config.http.max_payload_size_bytes.as_u64() as usize,
        ));

    router = router.layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            user = tracing::field::Empty,
        )
    }));

    if let Some(timeout) = config.http.request_timeout {
        router = router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ));
    }

    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router = router
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, RequestIdGenerator));

    router.layer(CatchPanicLayer::custom(
        |err: Box<dyn std::any::Any + Send + 'static>| {
            let msg = if let Some(s) = err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "unknown panic payload".to_string()
            };
            tracing::error!("Service panicked: {}", msg);

            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body("Internal Server Error".to_string())
                .unwrap_or_else(|_| Response::new("Internal Server Error".to_string()))
        },
    ))
}
