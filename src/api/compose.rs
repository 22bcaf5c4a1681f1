//! Route group composition.
//!
//! Each REST area (search, feedback, ...) is declared as a [`RouteGroup`]
//! with a tag. [`compose`] merges the groups into one router, tags every
//! route, and refuses surfaces the matcher could not serve unambiguously.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Request;
use axum::handler::Handler;
use axum::http::Method;
use axum::middleware::Next;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use matchit::InsertError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Route conflict: {0}")]
    Conflict(String),

    #[error("Invalid route path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Unsupported method {method} on '{path}'")]
    UnsupportedMethod { method: String, path: String },
}

/// Group tag of the route that served a request.
///
/// Inserted into both request and response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTag(pub Arc<str>);

impl RouteTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One row of the composed route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub tag: String,
}

struct RouteEntry<S> {
    method: Method,
    path: String,
    handler: Option<MethodRouter<S>>,
}

/// Handlers sharing one tag.
pub struct RouteGroup<S = ()> {
    tag: String,
    entries: Vec<RouteEntry<S>>,
}

impl<S> RouteGroup<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            entries: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn route<H, T>(mut self, method: Method, path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        let handler = MethodFilter::try_from(method.clone())
            .ok()
            .map(|filter| on(filter, handler));
        self.entries.push(RouteEntry {
            method,
            path: path.into(),
            handler,
        });
        self
    }
}

/// The merged surface of several route groups.
pub struct CompositeRouter<S = ()> {
    router: Router<S>,
    routes: Vec<RouteInfo>,
}

impl<S> std::fmt::Debug for CompositeRouter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeRouter")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl<S> CompositeRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Route table in registration order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    /// Distinct tags in first-registration order.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = Vec::new();
        for route in &self.routes {
            if !tags.contains(&route.tag.as_str()) {
                tags.push(&route.tag);
            }
        }
        tags
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }

    /// Serve the whole surface under `prefix`. An empty prefix or `/`
    /// mounts at the root.
    pub fn mount(self, prefix: &str) -> Result<Router<S>, ComposeError> {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Ok(self.router);
        }
        if !prefix.starts_with('/') {
            return Err(invalid_path(prefix, "paths must start with '/'"));
        }
        if prefix.split('/').any(|segment| segment.starts_with('*')) {
            return Err(invalid_path(prefix, "a mount prefix cannot contain a wildcard"));
        }
        Ok(Router::new().nest(prefix, self.router))
    }
}

fn invalid_path(path: &str, reason: impl Into<String>) -> ComposeError {
    ComposeError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Paths that differ only in parameter names match the same requests.
fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.chars().next() {
            Some(':') => ":",
            Some('*') => "*",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn tag_layer<S>(handler: MethodRouter<S>, tag: RouteTag) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    handler.layer(axum::middleware::from_fn(move |mut req: Request, next: Next| {
        let tag = tag.clone();
        async move {
            req.extensions_mut().insert(tag.clone());
            let mut response = next.run(req).await;
            response.extensions_mut().insert(tag);
            response
        }
    }))
}

/// Merge `groups` in order into one tagged router.
pub fn compose<S>(groups: Vec<RouteGroup<S>>) -> Result<CompositeRouter<S>, ComposeError>
where
    S: Clone + Send + Sync + 'static,
{
    let mut routes: Vec<RouteInfo> = Vec::new();
    // (declared path, handlers) per route shape, in first-seen order
    let mut paths: Vec<(String, Vec<MethodRouter<S>>)> = Vec::new();
    let mut by_shape: HashMap<String, usize> = HashMap::new();
    // Same matcher axum routes with; catches overlaps the shape check cannot.
    let mut matcher: matchit::Router<()> = matchit::Router::new();

    for group in groups {
        let tag = RouteTag(Arc::from(group.tag.as_str()));

        for entry in group.entries {
            if !entry.path.starts_with('/') {
                return Err(invalid_path(&entry.path, "paths must start with '/'"));
            }
            let handler = entry.handler.ok_or_else(|| ComposeError::UnsupportedMethod {
                method: entry.method.to_string(),
                path: entry.path.clone(),
            })?;

            let shape = route_shape(&entry.path);
            match by_shape.get(&shape) {
                Some(&i) => {
                    let (declared, handlers) = &mut paths[i];
                    if *declared != entry.path {
                        return Err(ComposeError::Conflict(format!(
                            "'{}' ({}) matches the same requests as '{declared}'",
                            entry.path, group.tag
                        )));
                    }
                    if let Some(existing) = routes
                        .iter()
                        .find(|r| r.path == entry.path && r.method == entry.method.as_str())
                    {
                        return Err(ComposeError::Conflict(format!(
                            "{} {} is declared by '{}' and '{}'",
                            entry.method, entry.path, existing.tag, group.tag
                        )));
                    }
                    handlers.push(tag_layer(handler, tag.clone()));
                }
                None => {
                    matcher
                        .insert(entry.path.clone(), ())
                        .map_err(|e| match e {
                            InsertError::Conflict { with } => ComposeError::Conflict(format!(
                                "'{}' ({}) overlaps '{with}'",
                                entry.path, group.tag
                            )),
                            other => invalid_path(&entry.path, other.to_string()),
                        })?;
                    by_shape.insert(shape, paths.len());
                    paths.push((entry.path.clone(), vec![tag_layer(handler, tag.clone())]));
                }
            }

            routes.push(RouteInfo {
                method: entry.method.to_string(),
                path: entry.path,
                tag: group.tag.clone(),
            });
        }
    }

    let mut router = Router::new();
    for (path, handlers) in paths {
        if let Some(merged) = handlers.into_iter().reduce(|a, b| a.merge(b)) {
            router = router.route(&path, merged);
        }
    }

    tracing::debug!(routes = routes.len(), "Route groups composed");
    Ok(CompositeRouter { router, routes })
}
