use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "anomaly-server-rs",
        description = "Telemetry anomaly-detection dashboard API"
    ),
    paths(
        crate::routes::health::healthz_handler,
        crate::routes::dashboard::stream,
        crate::routes::dashboard::histogram,
        crate::routes::dashboard::components,
        crate::routes::dashboard::metrics,
        crate::routes::detector::status,
        crate::routes::detector::get_config,
        crate::routes::detector::update_config,
        crate::routes::detector::refresh,
    ),
    components(schemas(
        crate::routes::health::HealthResponse,
        crate::routes::dashboard::MetricsView,
        crate::routes::detector::DetectorStatus,
        crate::routes::detector::DetectorConfigUpdate,
        crate::services::detector::DetectorSettings,
        crate::services::detector::StreamView,
        crate::services::detector::ActualPoint,
        crate::services::detector::PredictionPoint,
        crate::services::detector::HistogramBin,
        crate::services::model::SeasonalityConfig,
        crate::services::model::ForecastPoint,
        crate::services::model::ComponentSeries,
        crate::services::model::ComponentPoint,
    )),
    tags(
        (name = "dashboard", description = "Read-only chart data views"),
        (name = "detector", description = "Detector status and controls")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_default()
}
