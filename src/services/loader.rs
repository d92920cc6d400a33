use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use sqlx::PgPool;

use crate::series::{Series, SeriesPoint};

/// One raw telemetry sample before downsampling (typically 5-minute cadence).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub ts: NaiveDateTime,
    pub value: f64,
}

/// Where the actual-history series comes from. The detector only ever sees
/// the uniform daily series; every source funnels through the same
/// downsample-and-interpolate path.
pub enum SeriesSource {
    Csv { path: PathBuf },
    Postgres { pool: PgPool, sensor_id: String },
    Demo { days: usize },
}

impl SeriesSource {
    pub async fn load(&self) -> Result<Series> {
        match self {
            SeriesSource::Csv { path } => daily_series(&load_csv(path)?),
            SeriesSource::Postgres { pool, sensor_id } => load_postgres(pool, sensor_id).await,
            SeriesSource::Demo { days } => demo_series(*days),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SeriesSource::Csv { path } => format!("csv:{}", path.display()),
            SeriesSource::Postgres { sensor_id, .. } => format!("postgres:{sensor_id}"),
            SeriesSource::Demo { days } => format!("demo:{days}d"),
        }
    }
}

/// Reads `(timestamp, value)` rows; only the first value column is used.
/// Rows with an empty value cell are skipped and left to interpolation.
pub fn load_csv(path: &Path) -> Result<Vec<RawSample>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open samples CSV {}", path.display()))?;

    let mut samples = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read CSV record {index}"))?;
        let ts_raw = record
            .get(0)
            .with_context(|| format!("CSV record {index} has no timestamp column"))?;
        let ts = parse_timestamp(ts_raw)
            .with_context(|| format!("CSV record {index} has unparseable timestamp {ts_raw:?}"))?;

        let Some(value_raw) = record.get(1).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let value: f64 = value_raw
            .parse()
            .with_context(|| format!("CSV record {index} has unparseable value {value_raw:?}"))?;
        if value.is_finite() {
            samples.push(RawSample { ts, value });
        }
    }
    Ok(samples)
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight);
        }
    }
    anyhow::bail!("unsupported timestamp format: {raw:?}")
}

/// Downsamples raw samples to one mean per calendar day, then fills interior
/// gaps by linear interpolation between neighboring daily means. Leading and
/// trailing gaps are never invented.
pub fn daily_series(samples: &[RawSample]) -> Result<Series> {
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for sample in samples {
        if !sample.value.is_finite() {
            continue;
        }
        let bucket = buckets.entry(sample.ts.date()).or_insert((0.0, 0));
        bucket.0 += sample.value;
        bucket.1 += 1;
    }
    let means: BTreeMap<NaiveDate, f64> = buckets
        .into_iter()
        .map(|(day, (sum, count))| (day, sum / count as f64))
        .collect();
    interpolate_daily(&means)
}

/// Builds the contiguous daily series from sparse daily means.
pub fn interpolate_daily(means: &BTreeMap<NaiveDate, f64>) -> Result<Series> {
    anyhow::ensure!(!means.is_empty(), "no samples to build a series from");

    let entries: Vec<(NaiveDate, f64)> = means.iter().map(|(ts, v)| (*ts, *v)).collect();
    let mut points = Vec::new();
    for pair in entries.windows(2) {
        let (start_ts, start_value) = pair[0];
        let (end_ts, end_value) = pair[1];
        points.push(SeriesPoint {
            ts: start_ts,
            value: start_value,
        });
        let gap = (end_ts - start_ts).num_days();
        for step in 1..gap {
            let fraction = step as f64 / gap as f64;
            points.push(SeriesPoint {
                ts: start_ts + Duration::days(step),
                value: start_value + (end_value - start_value) * fraction,
            });
        }
    }
    if let Some((last_ts, last_value)) = entries.last() {
        points.push(SeriesPoint {
            ts: *last_ts,
            value: *last_value,
        });
    }
    Series::new(points)
}

/// Daily-bucketed load from the external metrics store.
pub async fn load_postgres(pool: &PgPool, sensor_id: &str) -> Result<Series> {
    let rows: Vec<(NaiveDate, f64)> = sqlx::query_as(
        r#"
        SELECT date_trunc('day', ts)::date AS day,
               AVG(value)::double precision AS value
        FROM metrics
        WHERE sensor_id = $1
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(sensor_id.trim())
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load daily series for sensor {sensor_id}"))?;

    let means: BTreeMap<NaiveDate, f64> = rows.into_iter().collect();
    interpolate_daily(&means)
}

/// Deterministic synthetic series so the server runs with no data
/// dependencies: mild upward trend, weekly and yearly cycles, bounded
/// jitter, and a few injected excursions.
pub fn demo_series(days: usize) -> Result<Series> {
    let origin =
        NaiveDate::from_ymd_opt(2022, 1, 1).context("demo origin date out of range")?;
    let points = (0..days)
        .map(|d| {
            let t = d as f64;
            let weekly = 1.5 * (2.0 * std::f64::consts::PI * t / 7.0).sin();
            let yearly = 3.0 * (2.0 * std::f64::consts::PI * t / 365.25).sin();
            let jitter = ((d.wrapping_mul(2_654_435_761) % 997) as f64 / 997.0 - 0.5) * 0.6;
            let spike = match d {
                200 => 9.0,
                650 => -8.0,
                900 => 6.0,
                _ => 0.0,
            };
            SeriesPoint {
                ts: origin + Duration::days(d as i64),
                value: 20.0 + 0.002 * t + weekly + yearly + jitter + spike,
            }
        })
        .collect();
    Series::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(day: u32, hour: u32, value: f64) -> RawSample {
        RawSample {
            ts: NaiveDate::from_ymd_opt(2024, 5, day)
                .expect("date")
                .and_hms_opt(hour, 0, 0)
                .expect("time"),
            value,
        }
    }

    #[test]
    fn downsamples_to_daily_means() {
        let samples = [
            sample(1, 0, 10.0),
            sample(1, 12, 20.0),
            sample(2, 6, 30.0),
        ];
        let series = daily_series(&samples).expect("series");
        assert_eq!(series.len(), 2);
        assert_eq!(series.values(), vec![15.0, 30.0]);
    }

    #[test]
    fn interpolates_interior_gaps_linearly() {
        // Day 1 mean 10, day 4 mean 40: days 2 and 3 are filled at 20 and 30.
        let samples = [sample(1, 0, 10.0), sample(4, 0, 40.0)];
        let series = daily_series(&samples).expect("series");
        assert_eq!(series.len(), 4);
        assert_eq!(series.values(), vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(daily_series(&[]).is_err());
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        for raw in [
            "2024-05-01 13:05:00",
            "2024-05-01T13:05:00",
            "2024-05-01T13:05:00+00:00",
            "2024-05-01 13:05",
        ] {
            let parsed = parse_timestamp(raw).expect(raw);
            assert_eq!(
                parsed.date(),
                NaiveDate::from_ymd_opt(2024, 5, 1).expect("date")
            );
        }
        let midnight = parse_timestamp("2024-05-01").expect("date only");
        assert_eq!(midnight.time(), chrono::NaiveTime::MIN);
        assert!(parse_timestamp("05/01/2024").is_err());
    }

    #[test]
    fn loads_csv_and_skips_blank_values() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "Datetime,TRW1MT (C)").expect("header");
        writeln!(file, "2024-05-01 00:00:00,19.5").expect("row");
        writeln!(file, "2024-05-01 00:05:00,").expect("row");
        writeln!(file, "2024-05-01 00:10:00,20.5").expect("row");
        file.flush().expect("flush");

        let samples = load_csv(file.path()).expect("load");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 19.5);
        assert_eq!(samples[1].value, 20.5);
    }

    #[test]
    fn csv_with_bad_value_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "Datetime,TRW1MT (C)").expect("header");
        writeln!(file, "2024-05-01 00:00:00,not-a-number").expect("row");
        file.flush().expect("flush");
        assert!(load_csv(file.path()).is_err());
    }

    #[test]
    fn demo_series_is_deterministic_and_contiguous() {
        let first = demo_series(400).expect("demo");
        let second = demo_series(400).expect("demo");
        assert_eq!(first, second);
        assert_eq!(first.len(), 400);
        // The injected excursion stands clear of the seasonal envelope.
        assert!(first.points()[200].value > 26.0);
    }
}
