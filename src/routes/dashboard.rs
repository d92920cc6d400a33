use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::services::detector::{HistogramBin, StreamView};
use crate::services::model::ComponentSeries;
use crate::state::AppState;

/// Metric-name → scalar error summary over the evaluated slice.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct MetricsView {
    pub metrics: BTreeMap<String, f64>,
}

#[utoipa::path(
    get,
    path = "/api/dashboard/stream",
    tag = "dashboard",
    responses((status = 200, description = "Actuals with severity tiers plus the forecast envelope", body = StreamView))
)]
pub(crate) async fn stream(State(state): State<AppState>) -> Json<StreamView> {
    let runtime = state.runtime.read().await;
    Json(runtime.detector.stream_view(&runtime.series_name))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/histogram",
    tag = "dashboard",
    responses((status = 200, description = "Histogram of observed actual values", body = Vec<HistogramBin>))
)]
pub(crate) async fn histogram(State(state): State<AppState>) -> Json<Vec<HistogramBin>> {
    let runtime = state.runtime.read().await;
    Json(runtime.detector.histogram_view())
}

#[utoipa::path(
    get,
    path = "/api/dashboard/components",
    tag = "dashboard",
    responses((status = 200, description = "Trend and seasonal component series", body = Vec<ComponentSeries>))
)]
pub(crate) async fn components(State(state): State<AppState>) -> Json<Vec<ComponentSeries>> {
    let runtime = state.runtime.read().await;
    Json(runtime.detector.components_view())
}

#[utoipa::path(
    get,
    path = "/api/dashboard/metrics",
    tag = "dashboard",
    responses((status = 200, description = "Error metric summary", body = MetricsView))
)]
pub(crate) async fn metrics(State(state): State<AppState>) -> Json<MetricsView> {
    let runtime = state.runtime.read().await;
    Json(MetricsView {
        metrics: runtime.detector.metrics_view(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/stream", get(stream))
        .route("/dashboard/histogram", get(histogram))
        .route("/dashboard/components", get(components))
        .route("/dashboard/metrics", get(metrics))
}
