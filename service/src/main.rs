#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::Parser;
use httpkit::{
    config::Config,
    http::{error_layer, request_id, RequestIdOptions},
    logging::{init_tracing, LogContext, Logger, TracingLogger},
    GracefulListener,
};
use tower::ServiceBuilder;

/// Demo service wiring the httpkit helpers together.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

// Health check handler
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn hello(ctx: LogContext) -> String {
    tracing::debug!(fields = ?ctx.fields(), "handling hello");
    match ctx.get("reqID").and_then(|id| id.as_str()) {
        Some(id) => format!("hello, request {id}\n"),
        None => "hello\n".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    // Load and validate configuration first (fail-fast)
    let config = Config::load_from(&args.config).map_err(|e| anyhow::anyhow!("{e}"))?;

    init_tracing(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "httpkit demo starting up"
    );

    let log: Arc<dyn Logger> = Arc::new(TracingLogger);

    // Later layers wrap earlier ones: request ids are assigned before the
    // error layer reads the logging context.
    let app = Router::new()
        .route("/", get(hello))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(error_layer(Arc::clone(&log)))
                .timeout(config.server.request_timeout()),
        )
        .layer(request_id(RequestIdOptions::from(&config.request_id)));

    tracing::info!(
        drain_timeout = ?config.shutdown.drain_timeout(),
        "Starting server at http://{}/",
        config.bind()
    );

    GracefulListener::new(log)
        .drain_timeout(config.shutdown.drain_timeout())
        .listen_until_signalled(&config.bind(), app)
        .await;

    Ok(())
}
