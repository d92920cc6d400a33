use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use anomaly_server_rs::services::detector::Detector;
use anomaly_server_rs::services::loader::SeriesSource;
use anomaly_server_rs::services::model::seasonal::HarmonicFitter;
use anomaly_server_rs::services::stream::StreamService;
use anomaly_server_rs::state::{AppState, DetectorRuntime};
use anomaly_server_rs::{cli, config, db, openapi, routes};

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind anomaly-server-rs listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind anomaly-server-rs listener on {addr}"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::AppConfig::from_env()?;

    let source = if let Some(path) = config.data_csv.clone() {
        SeriesSource::Csv { path }
    } else if let Some(url) = config.database_url.clone() {
        SeriesSource::Postgres {
            pool: db::connect_lazy(&url)?,
            sensor_id: config.sensor_id.clone(),
        }
    } else if config.demo_mode {
        SeriesSource::Demo {
            days: config.demo_days,
        }
    } else {
        anyhow::bail!(
            "no series source configured: set ANOMALY_DATA_CSV, ANOMALY_DATABASE_URL or ANOMALY_DEMO_MODE=1"
        );
    };

    tracing::info!(source = %source.describe(), "loading actual history");
    let series = source.load().await?;
    anyhow::ensure!(
        series.len() >= 2,
        "series has {} points; at least 2 are required",
        series.len()
    );

    let warmup = config.stream_warmup_points.clamp(2, series.len());
    let fitter = Arc::new(HarmonicFitter::new(config.interval_width));
    let detector = Detector::fit(fitter, &series.prefix(warmup), &config.detector)
        .context("initial model fit failed")?;
    tracing::info!(
        training_points = warmup,
        cutoff = %detector.training_cutoff(),
        "initial model fitted"
    );

    let runtime = DetectorRuntime::new(
        config.series_name.clone(),
        series,
        warmup,
        config.detector.clone(),
        detector,
    );
    let state = AppState {
        config: config.clone(),
        runtime: Arc::new(RwLock::new(runtime)),
    };

    let cancel = CancellationToken::new();
    StreamService::new(
        state.clone(),
        Duration::from_secs(config.stream_tick_seconds),
    )
    .start(cancel.clone());

    let app = routes::router(state).layer(CorsLayer::permissive());
    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "anomaly dashboard server listening");

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_cancel.cancel();
        })
        .await?;
    cancel.cancel();
    Ok(())
}
