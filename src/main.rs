use anyhow::{Context, Result};
use cityreports::{
    config::AppConfig,
    render::WkHtmlToPdf,
    server::{self, AppState},
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) config ───────────────────────────────────────────────────
    let config = AppConfig::from_env().context("reading configuration from environment")?;

    // ─── 2) init logging ─────────────────────────────────────────────
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(config.log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();
    info!("startup");

    // ─── 3) converter + state ────────────────────────────────────────
    let converter = Arc::new(WkHtmlToPdf::new(&config.wkhtmltopdf));
    info!(
        city_column = %config.city_column,
        cleanup_delay = ?config.cleanup_delay,
        converter = %config.wkhtmltopdf.display(),
        "configured"
    );
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let state = AppState::new(config, converter);

    // ─── 4) serve ────────────────────────────────────────────────────
    server::serve(state).await;
    Ok(())
}
