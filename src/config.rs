use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::services::detector::{DetectorSettings, HORIZON_MAX_DAYS, HORIZON_MIN_DAYS};
use crate::services::model::SeasonalityConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub series_name: String,
    pub data_csv: Option<PathBuf>,
    pub database_url: Option<String>,
    pub sensor_id: String,
    pub demo_mode: bool,
    pub demo_days: usize,
    pub stream_tick_seconds: u64,
    pub stream_warmup_points: usize,
    pub interval_width: f64,
    pub detector: DetectorSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let series_name = env_string("ANOMALY_SERIES_NAME", "Reaction Wheel Temperature");
        let data_csv = env_optional_string("ANOMALY_DATA_CSV").map(PathBuf::from);
        let database_url = env_optional_string("ANOMALY_DATABASE_URL");
        let sensor_id = env_string("ANOMALY_SENSOR_ID", "wheel_temperature");
        let demo_mode = env_bool("ANOMALY_DEMO_MODE", true);
        let demo_days = env_u64("ANOMALY_DEMO_DAYS", 1200).clamp(30, 20_000) as usize;
        let stream_tick_seconds = env_u64("ANOMALY_STREAM_TICK_SECONDS", 10).clamp(1, 3600);
        let stream_warmup_points = env_u64("ANOMALY_STREAM_WARMUP_POINTS", 40).max(2) as usize;

        let interval_width = env_f64("ANOMALY_INTERVAL_WIDTH", 0.8);
        if !interval_width.is_finite() || interval_width <= 0.0 || interval_width >= 1.0 {
            anyhow::bail!("ANOMALY_INTERVAL_WIDTH must be within (0, 1), got {interval_width}");
        }

        let horizon_days =
            env_u64("ANOMALY_HORIZON_DAYS", 30).clamp(HORIZON_MIN_DAYS as u64, HORIZON_MAX_DAYS as u64)
                as u32;
        let staleness_days = env_u64("ANOMALY_STALENESS_DAYS", 7).max(1) as u32;
        let severity_multipliers =
            parse_multipliers(&env_string("ANOMALY_SEVERITY_MULTIPLIERS", "2,4,8"))?;
        let seasonality = parse_seasonality(&env_string("ANOMALY_SEASONALITY", "weekly"))?;

        let detector = DetectorSettings {
            seasonality,
            horizon_days,
            staleness_days,
            severity_multipliers,
        };
        detector
            .validate()
            .map_err(|message| anyhow::anyhow!("invalid detector settings: {message}"))?;

        Ok(Self {
            series_name,
            data_csv,
            database_url,
            sensor_id,
            demo_mode,
            demo_days,
            stream_tick_seconds,
            stream_warmup_points,
            interval_width,
            detector,
        })
    }
}

/// Comma-separated severity multipliers, e.g. "2,4,8". Ordering and sign are
/// checked later by `DetectorSettings::validate`.
pub fn parse_multipliers(raw: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("invalid severity multiplier {token:?}"))
        })
        .collect()
}

/// Comma-separated seasonality selection out of daily/weekly/yearly; "none"
/// (or an empty string) selects nothing and defers to the model's own
/// detection.
pub fn parse_seasonality(raw: &str) -> Result<SeasonalityConfig> {
    let mut config = SeasonalityConfig::default();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.to_ascii_lowercase().as_str() {
            "daily" => config.daily = true,
            "weekly" => config.weekly = true,
            "yearly" => config.yearly = true,
            "none" => {}
            other => anyhow::bail!(
                "unknown seasonality {other:?}; expected daily, weekly, yearly or none"
            ),
        }
    }
    Ok(config)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(default)
}
