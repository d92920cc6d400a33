use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::services::detector::{Detector, DetectorSettings};
use crate::services::loader;
use crate::services::model::seasonal::HarmonicFitter;
use crate::services::model::SeasonalityConfig;
use crate::state::{AppState, DetectorRuntime};

pub fn demo_settings() -> DetectorSettings {
    DetectorSettings {
        seasonality: SeasonalityConfig {
            weekly: true,
            ..SeasonalityConfig::default()
        },
        horizon_days: 30,
        staleness_days: 7,
        severity_multipliers: vec![2.0, 4.0, 8.0],
    }
}

/// An AppState over the deterministic demo series, warmed up to `warmup`
/// observed points.
pub fn demo_state(days: usize, warmup: usize) -> AppState {
    let series = loader::demo_series(days).expect("demo series");
    let warmup = warmup.clamp(2, series.len());
    let settings = demo_settings();

    let config = AppConfig {
        series_name: "Reaction Wheel Temperature".to_string(),
        data_csv: None,
        database_url: None,
        sensor_id: "wheel_temperature".to_string(),
        demo_mode: true,
        demo_days: days,
        stream_tick_seconds: 1,
        stream_warmup_points: warmup,
        interval_width: 0.8,
        detector: settings.clone(),
    };

    let fitter = Arc::new(HarmonicFitter::default());
    let detector =
        Detector::fit(fitter, &series.prefix(warmup), &settings).expect("initial fit");
    let runtime = DetectorRuntime::new(
        config.series_name.clone(),
        series,
        warmup,
        settings,
        detector,
    );

    AppState {
        config,
        runtime: Arc::new(RwLock::new(runtime)),
    }
}
