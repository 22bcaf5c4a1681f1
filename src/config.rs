use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

/// Application-level constants
pub const APP_NAME: &str = "askpipe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_QUERY_PIPELINE: &str = "query_pipeline";
pub const DEFAULT_INDEX: &str = "document";

/// Get the application data directory (`~/.askpipe`).
///
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(format!(".{APP_NAME}"))
}

/// Default pipeline description path.
pub fn default_pipeline_path() -> PathBuf {
    app_data_dir().join("pipelines.yaml")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info,tower_http=warn")
}

/// Service configuration, from flags or `ASKPIPE_*` environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "askpipe", version, about = "Question answering over declarative retrieval pipelines.")]
pub struct Args {
    /// Pipeline description (.yaml, .yml or .json). Defaults to ~/.askpipe/pipelines.yaml.
    #[arg(long, env = "ASKPIPE_PIPELINE_PATH")]
    pub pipeline_path: Option<PathBuf>,

    /// Pipeline serving /query.
    #[arg(long, env = "ASKPIPE_QUERY_PIPELINE", default_value = DEFAULT_QUERY_PIPELINE)]
    pub query_pipeline: String,

    /// Pipeline serving /file-upload; upload is disabled when unset.
    #[arg(long, env = "ASKPIPE_INDEXING_PIPELINE")]
    pub indexing_pipeline: Option<String>,

    /// Document index used by the document and feedback endpoints.
    #[arg(long, env = "ASKPIPE_INDEX", default_value = DEFAULT_INDEX)]
    pub index: String,

    /// Worker threads per loaded pipeline.
    #[arg(long, env = "ASKPIPE_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Queries allowed in flight before /query answers 503.
    #[arg(long, env = "ASKPIPE_CONCURRENT_REQUEST_PER_WORKER", default_value_t = 4)]
    pub concurrent_request_per_worker: usize,

    #[arg(long, env = "ASKPIPE_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    #[arg(long, env = "ASKPIPE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Mount every route under this prefix, e.g. `/api`.
    #[arg(long, env = "ASKPIPE_API_PREFIX", default_value = "")]
    pub api_prefix: String,

    /// Allowed CORS origins (comma-separated). Any origin when empty.
    #[arg(long, env = "ASKPIPE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log filter, overridden by RUST_LOG.
    #[arg(long, env = "ASKPIPE_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn pipeline_path(&self) -> PathBuf {
        self.pipeline_path.clone().unwrap_or_else(default_pipeline_path)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Total queries in flight across the worker pool.
    pub fn request_limit(&self) -> usize {
        self.workers.max(1) * self.concurrent_request_per_worker.max(1)
    }

    pub fn log_filter(&self) -> String {
        self.log_level.clone().unwrap_or_else(default_log_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_path_under_app_data() {
        let path = default_pipeline_path();
        assert!(path.starts_with(app_data_dir()));
        assert!(path.ends_with("pipelines.yaml"));
    }

    #[test]
    fn app_data_dir_is_hidden_app_dir() {
        assert!(app_data_dir().ends_with(".askpipe"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["askpipe"]).unwrap();
        assert_eq!(args.query_pipeline, "query_pipeline");
        assert_eq!(args.indexing_pipeline, None);
        assert_eq!(args.index, "document");
        assert_eq!(args.addr().to_string(), "127.0.0.1:8000");
        assert_eq!(args.request_limit(), 16);
        assert_eq!(args.pipeline_path(), default_pipeline_path());
        assert!(args.cors_origins.is_empty());
    }

    #[test]
    fn args_from_flags() {
        let args = Args::try_parse_from([
            "askpipe",
            "--pipeline-path",
            "samples/pipeline/test_pipeline.yaml",
            "--indexing-pipeline",
            "indexing_pipeline",
            "--workers",
            "2",
            "--port",
            "9000",
            "--api-prefix",
            "/api",
            "--cors-origins",
            "http://a.test,http://b.test",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.pipeline_path(), PathBuf::from("samples/pipeline/test_pipeline.yaml"));
        assert_eq!(args.indexing_pipeline.as_deref(), Some("indexing_pipeline"));
        assert_eq!(args.request_limit(), 8);
        assert_eq!(args.addr().port(), 9000);
        assert_eq!(args.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(args.log_filter(), "debug");
    }
}
