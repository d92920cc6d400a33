pub mod classify;
pub mod metrics;
pub mod policy;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::Series;
use crate::services::model::{
    ComponentSeries, ForecastModel, ForecastPoint, ModelError, ModelFitter, SeasonalityConfig,
};

pub const MIN_TRAINING_POINTS: usize = 2;

pub const HORIZON_MIN_DAYS: u32 = 7;
pub const HORIZON_MAX_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("training series has {got} points; at least 2 are required")]
    InsufficientData { got: usize },
    #[error(
        "forecast table ends at {coverage_end} but data extends to {requested}; \
         extend the horizon before evaluating"
    )]
    HorizonExhausted {
        coverage_end: NaiveDate,
        requested: NaiveDate,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Caller-adjustable detector parameters: the seasonality selection, the
/// forecast horizon, the retrain cadence, and the severity thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DetectorSettings {
    pub seasonality: SeasonalityConfig,
    pub horizon_days: u32,
    pub staleness_days: u32,
    pub severity_multipliers: Vec<f64>,
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(HORIZON_MIN_DAYS..=HORIZON_MAX_DAYS).contains(&self.horizon_days) {
            return Err(format!(
                "horizon_days must be within {HORIZON_MIN_DAYS}..={HORIZON_MAX_DAYS}, got {}",
                self.horizon_days
            ));
        }
        if self.staleness_days == 0 {
            return Err("staleness_days must be >= 1".to_string());
        }
        if self.severity_multipliers.is_empty() {
            return Err("severity_multipliers must not be empty".to_string());
        }
        for window in self.severity_multipliers.windows(2) {
            if window[1] <= window[0] {
                return Err(format!(
                    "severity_multipliers must be strictly ascending: {} followed by {}",
                    window[0], window[1]
                ));
            }
        }
        if self
            .severity_multipliers
            .iter()
            .any(|m| !m.is_finite() || *m <= 0.0)
        {
            return Err("severity_multipliers must be positive and finite".to_string());
        }
        Ok(())
    }
}

/// One evaluated actual against its point forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct PredictionPoint {
    pub ts: NaiveDate,
    pub actual: f64,
    pub yhat: f64,
    pub residual: f64,
    pub anomaly: bool,
    /// 0 = normal; 1..=K = increasingly extreme deviation.
    pub severity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ActualPoint {
    pub ts: NaiveDate,
    pub value: f64,
    pub severity: u8,
}

/// The streaming chart view: evaluated actuals plus the forecast envelope.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct StreamView {
    pub series: String,
    pub actual: Vec<ActualPoint>,
    pub forecast: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// The detector: owns exactly one fitted model at a time plus the derived
/// forecast and prediction tables. Every public operation fully replaces the
/// table it derives; there is no incremental merging.
pub struct Detector {
    fitter: Arc<dyn ModelFitter>,
    model: Box<dyn ForecastModel>,
    seasonality: SeasonalityConfig,
    training_start: NaiveDate,
    training_cutoff: NaiveDate,
    horizon_days: u32,
    forecast: Vec<ForecastPoint>,
    predictions: Vec<PredictionPoint>,
}

impl Detector {
    /// Fits the initial model on `series` and derives both tables.
    pub fn fit(
        fitter: Arc<dyn ModelFitter>,
        series: &Series,
        settings: &DetectorSettings,
    ) -> Result<Self, DetectorError> {
        let (start, cutoff) = training_range(series)?;
        let model = fitter.fit(series, &settings.seasonality)?;
        let mut detector = Self {
            fitter,
            model,
            seasonality: settings.seasonality,
            training_start: start,
            training_cutoff: cutoff,
            horizon_days: 0,
            forecast: Vec::new(),
            predictions: Vec::new(),
        };
        detector.extend_horizon(settings.horizon_days)?;
        detector.evaluate(series, &settings.severity_multipliers)?;
        Ok(detector)
    }

    /// Retrains from scratch on `series` with the requested seasonality and
    /// regenerates the forecast table. The previous model is fully replaced.
    /// Fit failures propagate unchanged; no retry.
    pub fn refresh(
        &mut self,
        series: &Series,
        seasonality: SeasonalityConfig,
    ) -> Result<(), DetectorError> {
        let (start, cutoff) = training_range(series)?;
        self.model = self.fitter.fit(series, &seasonality)?;
        self.seasonality = seasonality;
        self.training_start = start;
        self.training_cutoff = cutoff;
        self.extend_horizon(self.horizon_days)
    }

    /// Regenerates the forecast table over the training window plus
    /// `period_days` beyond the training cutoff, at daily granularity,
    /// in-sample points included.
    pub fn extend_horizon(&mut self, period_days: u32) -> Result<(), DetectorError> {
        let end = self.training_cutoff + Duration::days(period_days as i64);
        let mut dates = Vec::new();
        let mut current = self.training_start;
        while current <= end {
            dates.push(current);
            current += Duration::days(1);
        }
        self.forecast = self.model.forecast(&dates)?;
        self.horizon_days = period_days;
        Ok(())
    }

    /// Re-derives the prediction table for `series` without retraining:
    /// forecasts at the series' own timestamps, residuals, severity tiers.
    /// Fails loudly if the series has outrun the forecast table's coverage.
    pub fn evaluate(
        &mut self,
        series: &Series,
        multipliers: &[f64],
    ) -> Result<(), DetectorError> {
        let Some(last_ts) = series.last_ts() else {
            self.predictions.clear();
            return Ok(());
        };
        let coverage_end = self.forecast.last().map(|p| p.ts).unwrap_or(self.training_cutoff);
        if last_ts > coverage_end {
            return Err(DetectorError::HorizonExhausted {
                coverage_end,
                requested: last_ts,
            });
        }

        let forecasts = self.model.forecast(&series.dates())?;
        let errors: Vec<f64> = series
            .points()
            .iter()
            .zip(forecasts.iter())
            .map(|(point, fc)| (point.value - fc.yhat).abs())
            .collect();
        let tiers = classify::classify(&errors, multipliers);

        self.predictions = series
            .points()
            .iter()
            .zip(forecasts.iter())
            .zip(tiers.iter())
            .map(|((point, fc), tier)| PredictionPoint {
                ts: point.ts,
                actual: point.value,
                yhat: fc.yhat,
                residual: point.value - fc.yhat,
                anomaly: *tier > 0,
                severity: *tier,
            })
            .collect();
        Ok(())
    }

    /// One caller-driven cycle: retrain if the refresh policy demands it,
    /// extend the forecast table if the horizon policy demands it, then
    /// evaluate. Safe to call repeatedly with identical inputs.
    pub fn run_cycle(
        &mut self,
        series: &Series,
        settings: &DetectorSettings,
    ) -> Result<(), DetectorError> {
        if let Some(last_ts) = series.last_ts() {
            if policy::needs_refresh(
                &settings.seasonality,
                last_ts,
                &self.seasonality,
                self.training_cutoff,
                settings.staleness_days,
            ) {
                self.refresh(series, settings.seasonality)?;
            }
        }
        if policy::needs_horizon_extension(
            settings.horizon_days,
            self.horizon_days,
            series.len(),
            self.forecast.len(),
        ) {
            self.extend_horizon(settings.horizon_days)?;
        }
        self.evaluate(series, &settings.severity_multipliers)
    }

    /// One scalar per metric over the current (actual, yhat) pairs. Pure and
    /// read-only.
    pub fn summarize_errors(&self, set: &[metrics::ErrorMetric]) -> BTreeMap<String, f64> {
        let actual: Vec<f64> = self.predictions.iter().map(|p| p.actual).collect();
        let predicted: Vec<f64> = self.predictions.iter().map(|p| p.yhat).collect();
        metrics::summarize_errors(&actual, &predicted, set)
    }

    pub fn stream_view(&self, series_name: &str) -> StreamView {
        StreamView {
            series: series_name.to_string(),
            actual: self
                .predictions
                .iter()
                .map(|p| ActualPoint {
                    ts: p.ts,
                    value: p.actual,
                    severity: p.severity,
                })
                .collect(),
            forecast: self.forecast.clone(),
        }
    }

    pub fn histogram_view(&self) -> Vec<HistogramBin> {
        let values: Vec<f64> = self.predictions.iter().map(|p| p.actual).collect();
        histogram(&values)
    }

    pub fn components_view(&self) -> Vec<ComponentSeries> {
        let dates: Vec<NaiveDate> = self.forecast.iter().map(|p| p.ts).collect();
        self.model.components(&dates)
    }

    pub fn metrics_view(&self) -> BTreeMap<String, f64> {
        self.summarize_errors(&metrics::default_metrics())
    }

    pub fn seasonality(&self) -> SeasonalityConfig {
        self.seasonality
    }

    pub fn training_cutoff(&self) -> NaiveDate {
        self.training_cutoff
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub fn forecast_len(&self) -> usize {
        self.forecast.len()
    }

    pub fn predictions(&self) -> &[PredictionPoint] {
        &self.predictions
    }
}

fn training_range(series: &Series) -> Result<(NaiveDate, NaiveDate), DetectorError> {
    if series.len() < MIN_TRAINING_POINTS {
        return Err(DetectorError::InsufficientData { got: series.len() });
    }
    match (series.first_ts(), series.last_ts()) {
        (Some(start), Some(cutoff)) => Ok((start, cutoff)),
        _ => Err(DetectorError::InsufficientData { got: series.len() }),
    }
}

/// Sturges-rule histogram over raw values; a constant slice collapses to a
/// single bin.
fn histogram(values: &[f64]) -> Vec<HistogramBin> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }
    let bins = ((values.len() as f64).log2().ceil() as usize + 1).max(1);
    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in values {
        let index = (((value - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: min + width * (i + 1) as f64,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesPoint;
    use crate::services::model::seasonal::HarmonicFitter;

    fn date(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 1).expect("date") + Duration::days(offset)
    }

    fn constant_series(days: i64, value: f64) -> Series {
        let points = (0..days)
            .map(|d| SeriesPoint {
                ts: date(d),
                value,
            })
            .collect();
        Series::new(points).expect("valid series")
    }

    fn with_appended(series: &Series, value: f64) -> Series {
        let mut points = series.points().to_vec();
        let next = points.last().map(|p| p.ts + Duration::days(1)).expect("non-empty");
        points.push(SeriesPoint { ts: next, value });
        Series::new(points).expect("valid series")
    }

    fn settings() -> DetectorSettings {
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

    fn fitter() -> Arc<dyn ModelFitter> {
        Arc::new(HarmonicFitter::default())
    }

    #[test]
    fn fit_requires_two_points() {
        let short = constant_series(1, 20.0);
        let err = Detector::fit(fitter(), &short, &settings());
        assert!(matches!(err, Err(DetectorError::InsufficientData { got: 1 })));
    }

    #[test]
    fn forecast_table_covers_training_plus_horizon() {
        let series = constant_series(60, 20.0);
        let detector = Detector::fit(fitter(), &series, &settings()).expect("fit");
        // 60 in-sample days plus 30 beyond the cutoff.
        assert_eq!(detector.forecast_len(), 90);
        assert_eq!(detector.training_cutoff(), date(59));
        assert_eq!(detector.horizon_days(), 30);
    }

    #[test]
    fn spike_after_constant_history_lands_at_top_tier() {
        // The spike contributes to the evaluated slice's statistics, so the
        // history must be long enough that sqrt(n - 1) clears the top
        // multiplier of 8.
        let series = constant_series(100, 20.0);
        let mut detector = Detector::fit(fitter(), &series, &settings()).expect("fit");

        let extended = with_appended(&series, 21.0);
        detector
            .evaluate(&extended, &settings().severity_multipliers)
            .expect("evaluate");

        let predictions = detector.predictions();
        assert_eq!(predictions.len(), 101);
        assert_eq!(predictions[100].severity, 3);
        assert!(predictions[..100].iter().all(|p| p.severity == 0));
    }

    #[test]
    fn evaluate_is_idempotent() {
        let series = constant_series(80, 20.0);
        let mut detector = Detector::fit(fitter(), &series, &settings()).expect("fit");
        let spiked = with_appended(&series, 24.0);

        detector
            .evaluate(&spiked, &settings().severity_multipliers)
            .expect("first evaluate");
        let first: Vec<u8> = detector.predictions().iter().map(|p| p.severity).collect();

        detector
            .evaluate(&spiked, &settings().severity_multipliers)
            .expect("second evaluate");
        let second: Vec<u8> = detector.predictions().iter().map(|p| p.severity).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn evaluate_past_coverage_fails_loudly() {
        let series = constant_series(30, 20.0);
        let mut config = settings();
        config.horizon_days = 7;
        let mut detector = Detector::fit(fitter(), &series, &config).expect("fit");

        // 30 training days + 7 horizon = coverage through date(36); extend
        // the actuals to date(40) without extending the horizon.
        let mut extended = series.clone();
        for value in [20.0, 20.0, 20.0, 20.0, 20.0, 20.0, 20.0, 20.0, 20.0, 20.0, 20.0] {
            extended = with_appended(&extended, value);
        }
        let err = detector.evaluate(&extended, &config.severity_multipliers);
        assert!(matches!(err, Err(DetectorError::HorizonExhausted { .. })));
    }

    #[test]
    fn run_cycle_extends_horizon_when_data_catches_up() {
        let series = constant_series(30, 20.0);
        let mut config = settings();
        config.horizon_days = 7;
        config.staleness_days = 365;
        let mut detector = Detector::fit(fitter(), &series, &config).expect("fit");
        assert_eq!(detector.forecast_len(), 37);

        // Grow the actuals to the stored table length; the cycle must extend
        // before evaluating instead of erroring out.
        let mut extended = series.clone();
        for _ in 0..7 {
            extended = with_appended(&extended, 20.0);
        }
        assert_eq!(extended.len(), 37);
        detector.run_cycle(&extended, &config).expect("cycle");
        assert_eq!(detector.predictions().len(), 37);
    }

    #[test]
    fn run_cycle_retrains_when_stale() {
        let series = constant_series(30, 20.0);
        let config = settings();
        let mut detector = Detector::fit(fitter(), &series, &config).expect("fit");
        assert_eq!(detector.training_cutoff(), date(29));

        let mut extended = series.clone();
        for _ in 0..7 {
            extended = with_appended(&extended, 20.0);
        }
        detector.run_cycle(&extended, &config).expect("cycle");
        // Seven elapsed days at staleness 7: retrained, cutoff advanced.
        assert_eq!(detector.training_cutoff(), date(36));
    }

    #[test]
    fn run_cycle_retrains_on_config_change() {
        let series = constant_series(30, 20.0);
        let config = settings();
        let mut detector = Detector::fit(fitter(), &series, &config).expect("fit");

        let extended = with_appended(&series, 20.0);
        let mut changed = config.clone();
        changed.seasonality = SeasonalityConfig::default();
        detector.run_cycle(&extended, &changed).expect("cycle");
        assert_eq!(detector.seasonality(), SeasonalityConfig::default());
        assert_eq!(detector.training_cutoff(), date(30));
    }

    #[test]
    fn run_cycle_reuses_model_when_fresh_and_unchanged() {
        let series = constant_series(30, 20.0);
        let config = settings();
        let mut detector = Detector::fit(fitter(), &series, &config).expect("fit");

        let extended = with_appended(&series, 20.0);
        detector.run_cycle(&extended, &config).expect("cycle");
        // One elapsed day at staleness 7: same model, same cutoff.
        assert_eq!(detector.training_cutoff(), date(29));
        assert_eq!(detector.predictions().len(), 31);
    }

    #[test]
    fn summarize_errors_tracks_a_close_fit() {
        let points = (0..60)
            .map(|d| SeriesPoint {
                ts: date(d),
                value: 10.0 + 0.5 * d as f64,
            })
            .collect();
        let series = Series::new(points).expect("valid series");
        let detector = Detector::fit(fitter(), &series, &settings()).expect("fit");
        let summary = detector.summarize_errors(&metrics::default_metrics());
        assert!(summary["MAE"] < 0.05, "MAE={}", summary["MAE"]);
        assert!(summary["MSE"] < 0.01, "MSE={}", summary["MSE"]);
        assert!(summary["R2"] > 0.999, "R2={}", summary["R2"]);
    }

    #[test]
    fn histogram_covers_all_samples() {
        let values: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let bins = histogram(&values);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 64);
        assert!(bins.len() > 1);
    }

    #[test]
    fn histogram_of_constant_values_is_one_bin() {
        let bins = histogram(&[5.0, 5.0, 5.0]);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 3);
    }

    #[test]
    fn settings_validation_rejects_bad_multipliers() {
        let mut config = settings();
        config.severity_multipliers = vec![4.0, 2.0];
        assert!(config.validate().is_err());

        config.severity_multipliers = vec![];
        assert!(config.validate().is_err());

        config.severity_multipliers = vec![-1.0, 2.0];
        assert!(config.validate().is_err());

        config.severity_multipliers = vec![2.0, 4.0, 8.0];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn settings_validation_bounds_horizon() {
        let mut config = settings();
        config.horizon_days = 3;
        assert!(config.validate().is_err());
        config.horizon_days = 400;
        assert!(config.validate().is_err());
        config.horizon_days = 365;
        assert!(config.validate().is_ok());
    }
}
