use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;

use crate::error::map_detector_error;
use crate::services::detector::DetectorSettings;
use crate::services::model::SeasonalityConfig;
use crate::state::{AppState, DetectorRuntime};

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DetectorStatus {
    pub series: String,
    pub training_cutoff: NaiveDate,
    pub horizon_days: u32,
    pub staleness_days: u32,
    pub seasonality: SeasonalityConfig,
    pub severity_multipliers: Vec<f64>,
    pub observed_points: usize,
    pub total_points: usize,
    pub forecast_len: usize,
}

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct DetectorConfigUpdate {
    pub seasonality: Option<SeasonalityConfig>,
    pub horizon_days: Option<u32>,
    pub staleness_days: Option<u32>,
    pub severity_multipliers: Option<Vec<f64>>,
}

fn status_of(runtime: &DetectorRuntime) -> DetectorStatus {
    DetectorStatus {
        series: runtime.series_name.clone(),
        training_cutoff: runtime.detector.training_cutoff(),
        horizon_days: runtime.detector.horizon_days(),
        staleness_days: runtime.settings.staleness_days,
        seasonality: runtime.detector.seasonality(),
        severity_multipliers: runtime.settings.severity_multipliers.clone(),
        observed_points: runtime.observed_points(),
        total_points: runtime.total_points(),
        forecast_len: runtime.detector.forecast_len(),
    }
}

#[utoipa::path(
    get,
    path = "/api/detector/status",
    tag = "detector",
    responses((status = 200, description = "Detector status", body = DetectorStatus))
)]
pub(crate) async fn status(State(state): State<AppState>) -> Json<DetectorStatus> {
    let runtime = state.runtime.read().await;
    Json(status_of(&runtime))
}

#[utoipa::path(
    get,
    path = "/api/detector/config",
    tag = "detector",
    responses((status = 200, description = "Active detector settings", body = DetectorSettings))
)]
pub(crate) async fn get_config(State(state): State<AppState>) -> Json<DetectorSettings> {
    let runtime = state.runtime.read().await;
    Json(runtime.settings.clone())
}

#[utoipa::path(
    put,
    path = "/api/detector/config",
    tag = "detector",
    request_body = DetectorConfigUpdate,
    responses(
        (status = 200, description = "Settings applied and one cycle evaluated", body = DetectorStatus),
        (status = 400, description = "Invalid settings"),
        (status = 409, description = "Forecast horizon exhausted"),
        (status = 422, description = "Not enough observed data"),
        (status = 502, description = "Model failure")
    )
)]
pub(crate) async fn update_config(
    State(state): State<AppState>,
    Json(payload): Json<DetectorConfigUpdate>,
) -> Result<Json<DetectorStatus>, (StatusCode, String)> {
    let mut runtime = state.runtime.write().await;

    let mut settings = runtime.settings.clone();
    if let Some(seasonality) = payload.seasonality {
        settings.seasonality = seasonality;
    }
    if let Some(horizon_days) = payload.horizon_days {
        settings.horizon_days = horizon_days;
    }
    if let Some(staleness_days) = payload.staleness_days {
        settings.staleness_days = staleness_days;
    }
    if let Some(severity_multipliers) = payload.severity_multipliers {
        settings.severity_multipliers = severity_multipliers;
    }
    settings
        .validate()
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;

    // The UI contract: a settings change takes effect immediately, not at the
    // next stream tick.
    runtime.settings = settings;
    runtime.run_cycle().map_err(map_detector_error)?;

    Ok(Json(status_of(&runtime)))
}

#[utoipa::path(
    post,
    path = "/api/detector/refresh",
    tag = "detector",
    responses(
        (status = 200, description = "Model retrained on the observed slice", body = DetectorStatus),
        (status = 422, description = "Not enough observed data"),
        (status = 502, description = "Model failure")
    )
)]
pub(crate) async fn refresh(
    State(state): State<AppState>,
) -> Result<Json<DetectorStatus>, (StatusCode, String)> {
    let mut runtime = state.runtime.write().await;
    runtime.force_refresh().map_err(map_detector_error)?;
    Ok(Json(status_of(&runtime)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/detector/status", get(status))
        .route("/detector/config", get(get_config).put(update_config))
        .route("/detector/refresh", post(refresh))
}
