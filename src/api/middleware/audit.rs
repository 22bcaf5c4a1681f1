//! Access logging middleware.
//!
//! Logs every API request with method, path, route tag, response status
//! and latency. The tag is read from the response, where the composed
//! router leaves it.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::compose::RouteTag;

pub async fn log_access(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let tag = response
        .extensions()
        .get::<RouteTag>()
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| "-".to_string());
    let latency_ms = started.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        tracing::warn!(%method, %path, %tag, status, latency_ms, "API request failed");
    } else {
        tracing::info!(%method, %path, %tag, status, latency_ms, "API request");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use crate::api::compose::{compose, RouteGroup};

    async fn ok() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn passes_responses_through() {
        let router: Router = compose(vec![RouteGroup::new("search").route(Method::GET, "/initialized", ok)])
            .unwrap()
            .into_router()
            .layer(axum::middleware::from_fn(log_access));

        let response = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/initialized")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.extensions().get::<RouteTag>().unwrap().as_str(), "search");

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
