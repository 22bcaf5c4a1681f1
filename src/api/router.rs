//! REST router.
//!
//! The four route groups are composed in a fixed order and share one
//! `ApiContext`. Layers (outermost → innermost):
//! 1. CORS → 2. Version header → 3. Audit logger → 4. Route tag → Handler

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::compose::{compose, CompositeRouter, RouteGroup};
use crate::api::endpoints::{documents, feedback, file_upload, search};
use crate::api::error::ApiError;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Response header carrying the service version.
pub const VERSION_HEADER: &str = "x-askpipe-version";

pub fn search_routes() -> RouteGroup<ApiContext> {
    RouteGroup::new("search")
        .route(Method::GET, "/initialized", search::initialized)
        .route(Method::GET, "/version", search::version)
        .route(Method::POST, "/query", search::query)
}

pub fn feedback_routes() -> RouteGroup<ApiContext> {
    RouteGroup::new("feedback")
        .route(Method::POST, "/feedback", feedback::record)
        .route(Method::GET, "/feedback", feedback::list)
        .route(Method::DELETE, "/feedback", feedback::delete)
        .route(Method::POST, "/eval-feedback", feedback::evaluate)
}

pub fn file_upload_routes() -> RouteGroup<ApiContext> {
    RouteGroup::new("file-upload").route(Method::POST, "/file-upload", file_upload::upload)
}

pub fn document_routes() -> RouteGroup<ApiContext> {
    RouteGroup::new("documents")
        .route(Method::POST, "/documents/get_by_filters", documents::get_by_filters)
        .route(Method::POST, "/documents/delete_by_filters", documents::delete_by_filters)
}

/// All route groups, composed in serving order.
pub fn composed_routes() -> Result<CompositeRouter<ApiContext>, ApiError> {
    Ok(compose(vec![
        search_routes(),
        feedback_routes(),
        file_upload_routes(),
        document_routes(),
    ])?)
}

/// Build the full REST router under `prefix`.
///
/// An empty `cors_origins` list allows any origin.
pub fn api_router(ctx: ApiContext, prefix: &str, cors_origins: &[String]) -> Result<Router, ApiError> {
    let composite = composed_routes()?;
    for route in composite.routes() {
        tracing::debug!(method = %route.method, path = %route.path, tag = %route.tag, "Route registered");
    }

    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Ok(composite
        .mount(prefix)?
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(VERSION_HEADER),
            HeaderValue::from_static(crate::config::APP_VERSION),
        ))
        .layer(cors))
}
