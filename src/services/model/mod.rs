pub mod seasonal;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::Series;

/// Seasonal components the forecasting model may incorporate. An empty
/// selection delegates to the model's own span-based detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SeasonalityConfig {
    #[serde(default)]
    pub daily: bool,
    #[serde(default)]
    pub weekly: bool,
    #[serde(default)]
    pub yearly: bool,
}

impl SeasonalityConfig {
    pub fn is_empty(&self) -> bool {
        !self.daily && !self.weekly && !self.yearly
    }
}

/// Point forecast with its confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ForecastPoint {
    pub ts: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ComponentPoint {
    pub ts: NaiveDate,
    pub value: f64,
}

/// One seasonal (or trend) component of the fitted model, evaluated over a
/// date range for the components view.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ComponentSeries {
    pub name: String,
    pub points: Vec<ComponentPoint>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training series has {got} points; at least 2 are required")]
    TooFewPoints { got: usize },
    #[error("normal equations are singular; model failed to converge")]
    SingularFit,
    #[error("interval width must be within (0, 1), got {got}")]
    InvalidIntervalWidth { got: f64 },
}

/// A fitted forecasting model. The detector never looks past this surface:
/// it hands over timestamps and receives point forecasts plus bounds.
pub trait ForecastModel: Send + Sync {
    fn forecast(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ModelError>;

    /// Trend and seasonal component series over `dates`, one entry per
    /// component the fit actually carries.
    fn components(&self, dates: &[NaiveDate]) -> Vec<ComponentSeries>;
}

/// Fits models from training series. Implementations are interchangeable;
/// the bundled default is [`seasonal::HarmonicFitter`].
pub trait ModelFitter: Send + Sync {
    fn fit(
        &self,
        series: &Series,
        seasonality: &SeasonalityConfig,
    ) -> Result<Box<dyn ForecastModel>, ModelError>;
}
