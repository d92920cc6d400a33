use chrono::NaiveDate;

use crate::services::model::SeasonalityConfig;

/// Whether the model must be retrained before the next evaluation: either the
/// requested seasonality no longer matches the one the model was fitted with,
/// or the data has moved at least `staleness_days` past the training cutoff.
///
/// A config mismatch is a retrain trigger, never an error surfaced to the
/// caller.
pub fn needs_refresh(
    requested: &SeasonalityConfig,
    last_ts: NaiveDate,
    fitted: &SeasonalityConfig,
    training_cutoff: NaiveDate,
    staleness_days: u32,
) -> bool {
    if requested != fitted {
        return true;
    }
    (last_ts - training_cutoff).num_days() >= staleness_days as i64
}

/// Whether the forecast table must be regenerated before the next evaluation:
/// the requested horizon changed, or the observed actuals have caught up with
/// the stored table and the confidence bounds are about to run out.
pub fn needs_horizon_extension(
    requested_days: u32,
    active_days: u32,
    observed_points: usize,
    forecast_len: usize,
) -> bool {
    requested_days != active_days || observed_points >= forecast_len
}
