use std::collections::BTreeMap;

/// Two-argument error function over (actual, predicted) sequences.
pub type MetricFn = fn(&[f64], &[f64]) -> f64;

#[derive(Debug, Clone, Copy)]
pub struct ErrorMetric {
    pub name: &'static str,
    pub compute: MetricFn,
}

/// The dashboard's metric set: mean absolute error, coefficient of
/// determination, mean squared error, median absolute error.
pub fn default_metrics() -> Vec<ErrorMetric> {
    vec![
        ErrorMetric { name: "MAE", compute: mean_absolute_error },
        ErrorMetric { name: "R2", compute: r2_score },
        ErrorMetric { name: "MSE", compute: mean_squared_error },
        ErrorMetric { name: "MedAE", compute: median_absolute_error },
    ]
}

/// One scalar per metric over the given pairs. Pure and read-only; mismatched
/// lengths are truncated to the shorter sequence.
pub fn summarize_errors(
    actual: &[f64],
    predicted: &[f64],
    metrics: &[ErrorMetric],
) -> BTreeMap<String, f64> {
    let n = actual.len().min(predicted.len());
    metrics
        .iter()
        .map(|metric| {
            (
                metric.name.to_string(),
                (metric.compute)(&actual[..n], &predicted[..n]),
            )
        })
        .collect()
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

pub fn median_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let mut deviations: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .collect();
    if deviations.is_empty() {
        return 0.0;
    }
    deviations.sort_by(|a, b| a.total_cmp(b));
    let mid = deviations.len() / 2;
    if deviations.len() % 2 == 1 {
        deviations[mid]
    } else {
        (deviations[mid - 1] + deviations[mid]) / 2.0
    }
}

/// Coefficient of determination, `1 - SS_res / SS_tot`. A constant actual
/// sequence has no variance to explain: a perfect fit scores 1.0, anything
/// else 0.0.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_score_perfectly() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let summary = summarize_errors(&actual, &actual, &default_metrics());
        assert_eq!(summary["MAE"], 0.0);
        assert_eq!(summary["MSE"], 0.0);
        assert_eq!(summary["MedAE"], 0.0);
        assert_eq!(summary["R2"], 1.0);
    }

    #[test]
    fn mae_and_mse_on_known_offsets() {
        let actual = [1.0, 2.0, 3.0];
        let predicted = [2.0, 2.0, 1.0];
        assert!((mean_absolute_error(&actual, &predicted) - 1.0).abs() < 1e-12);
        assert!((mean_squared_error(&actual, &predicted) - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn median_absolute_error_even_and_odd() {
        let actual = [0.0, 0.0, 0.0];
        assert_eq!(median_absolute_error(&actual, &[1.0, 2.0, 9.0]), 2.0);
        let actual = [0.0, 0.0, 0.0, 0.0];
        assert_eq!(median_absolute_error(&actual, &[1.0, 2.0, 4.0, 9.0]), 3.0);
    }

    #[test]
    fn r2_handles_constant_actuals() {
        let constant = [5.0, 5.0, 5.0];
        assert_eq!(r2_score(&constant, &constant), 1.0);
        assert_eq!(r2_score(&constant, &[5.0, 5.0, 6.0]), 0.0);
    }

    #[test]
    fn summarize_is_pure_and_repeatable() {
        let actual = [1.0, 5.0, 2.0];
        let predicted = [1.5, 4.0, 2.5];
        let first = summarize_errors(&actual, &predicted, &default_metrics());
        let second = summarize_errors(&actual, &predicted, &default_metrics());
        assert_eq!(first, second);
    }
}
