use anyhow::Context;
use dotenvy::dotenv;
use mediashrink::config::settings::AppConfig;
use mediashrink::modules::compress::service::CompressService;
use mediashrink::state::AppState;
use mediashrink::{app, workers};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    info!("Starting mediashrink...");

    let config = AppConfig::from_env();
    let port = config.server_port;
    let state = AppState::new(config).await?;

    if state.encoder.is_available().await {
        info!(program = %state.encoder.program().display(), "✅ Encoder available");
    } else {
        warn!(
            program = %state.encoder.program().display(),
            "⚠️ Encoder not found, uploads will fail until it is installed"
        );
    }

    let report = CompressService::sweep(&state).await;
    info!(removed = report.removed, failed = report.failed, "🧹 Startup sweep done");

    tokio::spawn(workers::sweeper::start_sweeper_worker(state.clone()));

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Server running on http://{}", addr);
    info!("📖 Swagger UI at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
