use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::series::Series;
use crate::services::detector::{Detector, DetectorError, DetectorSettings};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub runtime: Arc<RwLock<DetectorRuntime>>,
}

/// The single-writer detector context: the full actual history, the reveal
/// cursor driving the simulated stream, the caller-adjustable settings, and
/// the detector itself. All mutation happens through the stream ticker or a
/// config update, each of which completes a full cycle while holding the
/// write half of the lock.
pub struct DetectorRuntime {
    pub series_name: String,
    pub settings: DetectorSettings,
    pub detector: Detector,
    series: Series,
    cursor: usize,
}

impl DetectorRuntime {
    pub fn new(
        series_name: String,
        series: Series,
        cursor: usize,
        settings: DetectorSettings,
        detector: Detector,
    ) -> Self {
        let cursor = cursor.min(series.len());
        Self {
            series_name,
            settings,
            detector,
            series,
            cursor,
        }
    }

    /// The slice of history revealed so far.
    pub fn observed(&self) -> Series {
        self.series.prefix(self.cursor)
    }

    pub fn observed_points(&self) -> usize {
        self.cursor
    }

    pub fn total_points(&self) -> usize {
        self.series.len()
    }

    /// Reveals one more point; false once the history is fully replayed.
    pub fn advance(&mut self) -> bool {
        if self.cursor >= self.series.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn run_cycle(&mut self) -> Result<(), DetectorError> {
        let observed = self.observed();
        self.detector.run_cycle(&observed, &self.settings)
    }

    /// Unconditional retrain on the observed slice, then re-evaluate.
    pub fn force_refresh(&mut self) -> Result<(), DetectorError> {
        let observed = self.observed();
        self.detector.refresh(&observed, self.settings.seasonality)?;
        self.detector
            .evaluate(&observed, &self.settings.severity_multipliers)
    }
}
