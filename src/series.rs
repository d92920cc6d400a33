use chrono::NaiveDate;
use serde::Serialize;

/// One daily observation of the monitored telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SeriesPoint {
    pub ts: NaiveDate,
    pub value: f64,
}

/// A uniform daily time series: strictly increasing timestamps, one point per
/// calendar day, no gaps. Upstream loaders are responsible for downsampling
/// and interpolation; construction rejects anything that breaks the invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    points: Vec<SeriesPoint>,
}

impl Series {
    pub fn new(points: Vec<SeriesPoint>) -> anyhow::Result<Self> {
        for window in points.windows(2) {
            let gap = (window[1].ts - window[0].ts).num_days();
            if gap <= 0 {
                anyhow::bail!(
                    "series timestamps must be strictly increasing: {} followed by {}",
                    window[0].ts,
                    window[1].ts
                );
            }
            if gap != 1 {
                anyhow::bail!(
                    "series must be contiguous daily data: {} day gap between {} and {}",
                    gap,
                    window[0].ts,
                    window[1].ts
                );
            }
        }
        for point in &points {
            if !point.value.is_finite() {
                anyhow::bail!("series value at {} is not finite", point.ts);
            }
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn first_ts(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.ts)
    }

    pub fn last_ts(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.ts)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.ts).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// The first `count` points as a series. A prefix of a valid series is
    /// itself valid, so no re-validation happens here.
    pub fn prefix(&self, count: usize) -> Series {
        Series {
            points: self.points[..count.min(self.points.len())].to_vec(),
        }
    }
}
