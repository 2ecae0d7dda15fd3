use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::hub::Hub;
use crate::ws::ws_handler;

/// Default path the WebSocket endpoint is mounted on.
pub const DEFAULT_WS_PATH: &str = "/remy";

/// Hub routes: the WebSocket endpoint, health check and CORS handling.
pub fn router(hub: Arc<Hub>, ws_path: &str) -> Router {
    let banner = format!("WebSocket server is running. Connect via {}", ws_path);

    Router::new()
        .route("/health", get(health))
        .route(ws_path, get(ws_handler))
        .fallback(move || {
            let banner = banner.clone();
            async move { (StatusCode::OK, banner) }
        })
        .with_state(hub)
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "ok")
}

/// Answer preflight requests directly and allow any origin.
async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}
