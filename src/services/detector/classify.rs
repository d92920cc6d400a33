/// Mean and population standard deviation (divisor N) of a slice of
/// absolute errors. Thresholds are derived from the whole slice in one shot;
/// already-flagged points are never excluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorStats {
    pub mean: f64,
    pub std: f64,
}

pub fn error_stats(errors: &[f64]) -> ErrorStats {
    if errors.is_empty() {
        return ErrorStats { mean: 0.0, std: 0.0 };
    }
    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let variance = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
    ErrorStats {
        mean,
        std: variance.sqrt(),
    }
}

/// Severity tier per error: the largest index `i` (1-based) whose threshold
/// `mean + multipliers[i-1] * std` the error strictly exceeds, or 0.
///
/// Single static pass per threshold; later thresholds overwrite earlier tiers,
/// so with ascending multipliers the result is the largest exceeded tier.
/// A zero-variance slice degenerates to `mean + 0` for every threshold, so a
/// constant history sends any deviating point straight to the top tier.
pub fn classify(errors: &[f64], multipliers: &[f64]) -> Vec<u8> {
    let stats = error_stats(errors);
    let mut tiers = vec![0u8; errors.len()];
    for (index, multiplier) in multipliers.iter().enumerate() {
        let threshold = stats.mean + multiplier * stats.std;
        let tier = (index + 1).min(u8::MAX as usize) as u8;
        for (error, slot) in errors.iter().zip(tiers.iter_mut()) {
            if *error > threshold {
                *slot = tier;
            }
        }
    }
    tiers
}
