use anyhow::{Context, Result};
use clap::Parser;
use docchat::{api, config, logging, processing};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "docchat", version, about = "Chat with an uploaded PDF over HTTP")]
struct Cli {
    /// Address to bind (overrides `SERVER_HOST`).
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (overrides `SERVER_PORT`).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load config from environment")?;
    let _log_guard = logging::init_tracing(config.log_file.as_deref());
    tracing::debug!(
        llm_model = %config.llm_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        top_k = config.retriever_top_k,
        data_dir = %config.data_dir.display(),
        "Loaded configuration"
    );

    let service = processing::DocumentService::from_config(config)
        .context("Failed to initialize document service")?;
    let app = api::create_router(Arc::new(service), &api::ApiOptions::from_config(config));

    let host = cli.host.unwrap_or_else(|| config.server_host.clone());
    let port = cli.port.unwrap_or(config.server_port);
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
