pub mod api;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod text;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::ApiContext;
use crate::config::Args;
use crate::pipeline::{PipelineError, PipelineLoader};
use crate::store::StoreCatalog;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Server(String),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `filter`.
pub fn init_tracing(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .try_init();
}

/// Load the configured pipelines, serve the REST API until Ctrl-C, then
/// release everything.
pub async fn run(args: Args) -> Result<(), AppError> {
    tracing::info!("askpipe starting v{}", config::APP_VERSION);

    let path = args.pipeline_path();
    let loader = PipelineLoader::new(StoreCatalog::new());

    let query = Arc::new(loader.load_from_path(&path, &args.query_pipeline, args.workers)?);
    let indexing = match &args.indexing_pipeline {
        Some(name) => Some(Arc::new(loader.load_from_path(&path, name, args.workers)?)),
        None => {
            tracing::info!("No indexing pipeline configured, file upload disabled");
            None
        }
    };

    let ctx = ApiContext::new(
        query.clone(),
        indexing.clone(),
        loader.catalog().clone(),
        args.index.clone(),
        args.request_limit(),
    );

    let server = api::start_server(ctx, args.addr(), &args.api_prefix, &args.cors_origins)
        .await
        .map_err(AppError::Server)?;
    tracing::info!(
        addr = %server.session.server_addr,
        session = %server.session.session_id,
        "Serving"
    );

    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");

    server.stop().await;
    query.shutdown();
    if let Some(indexing) = indexing {
        indexing.shutdown();
    }

    signal?;
    Ok(())
}
