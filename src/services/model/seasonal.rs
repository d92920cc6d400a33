use chrono::NaiveDate;
use nalgebra::{Cholesky, DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

use super::{
    ComponentPoint, ComponentSeries, ForecastModel, ForecastPoint, ModelError, ModelFitter,
    SeasonalityConfig,
};
use crate::series::Series;

const WEEKLY_PERIOD_DAYS: f64 = 7.0;
const YEARLY_PERIOD_DAYS: f64 = 365.25;
const WEEKLY_FOURIER_ORDER: usize = 3;
const YEARLY_FOURIER_ORDER: usize = 6;

// Span thresholds for enabling a component when the caller selects none.
const AUTO_WEEKLY_MIN_SPAN_DAYS: i64 = 14;
const AUTO_YEARLY_MIN_SPAN_DAYS: i64 = 730;

/// Fits a linear trend plus Fourier seasonal terms with a small ridge penalty
/// on the normal equations. Confidence bands are `yhat ± z·sigma` where
/// `sigma` is the population residual standard deviation and `z` matches the
/// configured interval width.
pub struct HarmonicFitter {
    interval_width: f64,
    ridge: f64,
}

impl HarmonicFitter {
    pub fn new(interval_width: f64) -> Self {
        Self {
            interval_width,
            ridge: 1e-3,
        }
    }
}

impl Default for HarmonicFitter {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[derive(Debug, Clone, Copy)]
struct FeatureLayout {
    scale: f64,
    weekly: bool,
    yearly: bool,
}

impl FeatureLayout {
    fn width(&self) -> usize {
        let mut p = 2;
        if self.weekly {
            p += 2 * WEEKLY_FOURIER_ORDER;
        }
        if self.yearly {
            p += 2 * YEARLY_FOURIER_ORDER;
        }
        p
    }

    fn features(&self, t_days: f64) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.push(t_days / self.scale);
        if self.weekly {
            push_fourier(&mut row, t_days, WEEKLY_PERIOD_DAYS, WEEKLY_FOURIER_ORDER);
        }
        if self.yearly {
            push_fourier(&mut row, t_days, YEARLY_PERIOD_DAYS, YEARLY_FOURIER_ORDER);
        }
        row
    }
}

fn push_fourier(row: &mut Vec<f64>, t_days: f64, period: f64, order: usize) {
    for k in 1..=order {
        let angle = 2.0 * std::f64::consts::PI * (k as f64) * t_days / period;
        row.push(angle.sin());
        row.push(angle.cos());
    }
}

fn z_for_interval_width(width: f64) -> Result<f64, ModelError> {
    if !width.is_finite() || width <= 0.0 || width >= 1.0 {
        return Err(ModelError::InvalidIntervalWidth { got: width });
    }
    let normal =
        Normal::new(0.0, 1.0).map_err(|_| ModelError::InvalidIntervalWidth { got: width })?;
    Ok(normal.inverse_cdf(0.5 + width / 2.0))
}

impl ModelFitter for HarmonicFitter {
    fn fit(
        &self,
        series: &Series,
        seasonality: &SeasonalityConfig,
    ) -> Result<Box<dyn ForecastModel>, ModelError> {
        let n = series.len();
        let (Some(origin), Some(last)) = (series.first_ts(), series.last_ts()) else {
            return Err(ModelError::TooFewPoints { got: 0 });
        };
        if n < 2 {
            return Err(ModelError::TooFewPoints { got: n });
        }
        let z = z_for_interval_width(self.interval_width)?;

        let span_days = (last - origin).num_days();
        let (weekly, yearly, daily) = if seasonality.is_empty() {
            (
                span_days >= AUTO_WEEKLY_MIN_SPAN_DAYS,
                span_days >= AUTO_YEARLY_MIN_SPAN_DAYS,
                false,
            )
        } else {
            // Daily seasonality is not estimable from daily-cadence data; the
            // flag is honored as a zero component rather than rejected.
            (seasonality.weekly, seasonality.yearly, seasonality.daily)
        };

        let layout = FeatureLayout {
            scale: span_days.max(1) as f64,
            weekly,
            yearly,
        };
        let p = layout.width();

        let mut flat = Vec::with_capacity(n * p);
        for point in series.points() {
            let t = (point.ts - origin).num_days() as f64;
            flat.extend(layout.features(t));
        }
        let x = DMatrix::from_row_slice(n, p, &flat);
        let y = DVector::from_vec(series.values());

        let mut xtx = x.transpose() * &x;
        for i in 0..p {
            xtx[(i, i)] += self.ridge;
        }
        let xty = x.transpose() * &y;
        let beta = Cholesky::new(xtx)
            .ok_or(ModelError::SingularFit)?
            .solve(&xty);

        let fitted = &x * &beta;
        let residuals: Vec<f64> = (0..n).map(|i| y[i] - fitted[i]).collect();
        let mean = residuals.iter().sum::<f64>() / n as f64;
        let sigma = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64).sqrt();

        Ok(Box::new(FittedHarmonic {
            origin,
            layout,
            beta,
            sigma,
            z,
            daily,
        }))
    }
}

struct FittedHarmonic {
    origin: NaiveDate,
    layout: FeatureLayout,
    beta: DVector<f64>,
    sigma: f64,
    z: f64,
    daily: bool,
}

impl FittedHarmonic {
    fn t_days(&self, date: NaiveDate) -> f64 {
        (date - self.origin).num_days() as f64
    }

    fn predict(&self, date: NaiveDate) -> f64 {
        let row = self.layout.features(self.t_days(date));
        row.iter()
            .zip(self.beta.iter())
            .map(|(feature, coef)| feature * coef)
            .sum()
    }

    /// Contribution of the coefficient block `[start, start + len)`.
    fn block_contribution(&self, date: NaiveDate, start: usize, len: usize) -> f64 {
        let row = self.layout.features(self.t_days(date));
        row.iter()
            .zip(self.beta.iter())
            .skip(start)
            .take(len)
            .map(|(feature, coef)| feature * coef)
            .sum()
    }
}

impl ForecastModel for FittedHarmonic {
    fn forecast(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ModelError> {
        let half_band = self.z * self.sigma;
        Ok(dates
            .iter()
            .map(|&ts| {
                let yhat = self.predict(ts);
                ForecastPoint {
                    ts,
                    yhat,
                    yhat_lower: yhat - half_band,
                    yhat_upper: yhat + half_band,
                }
            })
            .collect())
    }

    fn components(&self, dates: &[NaiveDate]) -> Vec<ComponentSeries> {
        let mut out = Vec::new();

        let trend = dates
            .iter()
            .map(|&ts| ComponentPoint {
                ts,
                value: self.block_contribution(ts, 0, 2),
            })
            .collect();
        out.push(ComponentSeries {
            name: "trend".to_string(),
            points: trend,
        });

        let mut offset = 2;
        if self.daily {
            out.push(ComponentSeries {
                name: "daily".to_string(),
                points: dates
                    .iter()
                    .map(|&ts| ComponentPoint { ts, value: 0.0 })
                    .collect(),
            });
        }
        if self.layout.weekly {
            let len = 2 * WEEKLY_FOURIER_ORDER;
            out.push(ComponentSeries {
                name: "weekly".to_string(),
                points: dates
                    .iter()
                    .map(|&ts| ComponentPoint {
                        ts,
                        value: self.block_contribution(ts, offset, len),
                    })
                    .collect(),
            });
            offset += len;
        }
        if self.layout.yearly {
            let len = 2 * YEARLY_FOURIER_ORDER;
            out.push(ComponentSeries {
                name: "yearly".to_string(),
                points: dates
                    .iter()
                    .map(|&ts| ComponentPoint {
                        ts,
                        value: self.block_contribution(ts, offset, len),
                    })
                    .collect(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesPoint;
    use chrono::Duration;

    fn date(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).expect("date") + Duration::days(offset)
    }

    fn series_from_fn(days: i64, f: impl Fn(f64) -> f64) -> Series {
        let points = (0..days)
            .map(|d| SeriesPoint {
                ts: date(d),
                value: f(d as f64),
            })
            .collect();
        Series::new(points).expect("valid series")
    }

    fn weekly_only() -> SeasonalityConfig {
        SeasonalityConfig {
            weekly: true,
            ..SeasonalityConfig::default()
        }
    }

    #[test]
    fn flat_series_forecasts_flat_with_collapsed_bands() {
        let series = series_from_fn(30, |_| 20.0);
        let model = HarmonicFitter::default()
            .fit(&series, &weekly_only())
            .expect("fit");

        let forecast = model.forecast(&[date(35), date(40)]).expect("forecast");
        for point in forecast {
            assert!((point.yhat - 20.0).abs() < 0.1, "yhat={}", point.yhat);
            assert!(point.yhat_upper - point.yhat_lower < 0.1);
        }
    }

    #[test]
    fn recovers_linear_trend() {
        let series = series_from_fn(40, |t| 10.0 + 0.5 * t);
        let model = HarmonicFitter::default()
            .fit(&series, &weekly_only())
            .expect("fit");

        let forecast = model.forecast(&[date(50)]).expect("forecast");
        assert!((forecast[0].yhat - 35.0).abs() < 0.5, "yhat={}", forecast[0].yhat);
    }

    #[test]
    fn recovers_weekly_pattern() {
        let weekly = |t: f64| 20.0 + 3.0 * (2.0 * std::f64::consts::PI * t / 7.0).sin();
        let series = series_from_fn(56, weekly);
        let model = HarmonicFitter::default()
            .fit(&series, &weekly_only())
            .expect("fit");

        for offset in 60..67 {
            let forecast = model.forecast(&[date(offset)]).expect("forecast");
            assert!(
                (forecast[0].yhat - weekly(offset as f64)).abs() < 0.3,
                "day {offset}: yhat={} expected={}",
                forecast[0].yhat,
                weekly(offset as f64)
            );
        }
    }

    #[test]
    fn auto_detection_follows_span_rules() {
        let auto = SeasonalityConfig::default();

        let short = series_from_fn(10, |t| t);
        let model = HarmonicFitter::default().fit(&short, &auto).expect("fit");
        let names: Vec<String> = model
            .components(&[date(0)])
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["trend"]);

        let medium = series_from_fn(60, |t| t);
        let model = HarmonicFitter::default().fit(&medium, &auto).expect("fit");
        let names: Vec<String> = model
            .components(&[date(0)])
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["trend", "weekly"]);

        let long = series_from_fn(800, |t| t);
        let model = HarmonicFitter::default().fit(&long, &auto).expect("fit");
        let names: Vec<String> = model
            .components(&[date(0)])
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["trend", "weekly", "yearly"]);
    }

    #[test]
    fn daily_flag_yields_zero_component() {
        let series = series_from_fn(30, |t| t);
        let config = SeasonalityConfig {
            daily: true,
            weekly: true,
            yearly: false,
        };
        let model = HarmonicFitter::default().fit(&series, &config).expect("fit");
        let components = model.components(&[date(0), date(5)]);
        let daily = components
            .iter()
            .find(|c| c.name == "daily")
            .expect("daily component");
        assert!(daily.points.iter().all(|p| p.value == 0.0));
    }

    #[test]
    fn too_few_points_is_an_error() {
        let series = series_from_fn(1, |_| 20.0);
        let err = HarmonicFitter::default().fit(&series, &weekly_only());
        assert!(matches!(err, Err(ModelError::TooFewPoints { got: 1 })));
    }

    #[test]
    fn invalid_interval_width_is_an_error() {
        let series = series_from_fn(10, |_| 20.0);
        let err = HarmonicFitter::new(1.5).fit(&series, &weekly_only());
        assert!(matches!(
            err,
            Err(ModelError::InvalidIntervalWidth { .. })
        ));
    }
}
