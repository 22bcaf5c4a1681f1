//! Shared types for the REST layer.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::api::error::ApiError;
use crate::pipeline::RunnablePipeline;
use crate::store::{InMemoryDocumentStore, StoreCatalog};

// ═══════════════════════════════════════════════════════════
// API context: shared state for all route groups
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub query_pipeline: Arc<RunnablePipeline>,
    /// `None` when the service was started without an indexing pipeline.
    pub indexing_pipeline: Option<Arc<RunnablePipeline>>,
    pub catalog: StoreCatalog,
    /// Index served by the document and feedback endpoints.
    pub index: String,
    pub request_limiter: RequestLimiter,
}

impl ApiContext {
    pub fn new(
        query_pipeline: Arc<RunnablePipeline>,
        indexing_pipeline: Option<Arc<RunnablePipeline>>,
        catalog: StoreCatalog,
        index: impl Into<String>,
        concurrent_requests: usize,
    ) -> Self {
        Self {
            query_pipeline,
            indexing_pipeline,
            catalog,
            index: index.into(),
            request_limiter: RequestLimiter::new(concurrent_requests),
        }
    }

    /// Document store for the served index, created on first use.
    pub fn store(&self) -> Result<Arc<InMemoryDocumentStore>, ApiError> {
        Ok(self.catalog.get_or_create(&self.index)?)
    }
}

// ═══════════════════════════════════════════════════════════
// Request limiter
// ═══════════════════════════════════════════════════════════

/// Caps the number of queries in flight. Excess requests are refused
/// immediately rather than queued.
#[derive(Clone)]
pub struct RequestLimiter {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl RequestLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Take a slot, or `ApiError::Busy` when all are in use.
    pub fn acquire(&self) -> Result<OwnedSemaphorePermit, ApiError> {
        self.permits.clone().try_acquire_owned().map_err(|_| {
            tracing::warn!(limit = self.limit, "Request limit reached");
            ApiError::Busy
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_refuses_when_full() {
        let limiter = RequestLimiter::new(2);
        let a = limiter.acquire().unwrap();
        let _b = limiter.acquire().unwrap();
        assert!(matches!(limiter.acquire(), Err(ApiError::Busy)));

        drop(a);
        assert!(limiter.acquire().is_ok());
    }

    #[test]
    fn limiter_has_at_least_one_slot() {
        let limiter = RequestLimiter::new(0);
        assert_eq!(limiter.limit(), 1);
        assert!(limiter.acquire().is_ok());
    }
}
