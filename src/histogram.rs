/// Time-bucketed histograms with anomaly detection and ASCII rendering
use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;

/// Target bucket count when the size is chosen automatically.
pub const TARGET_BUCKETS: usize = 20;
/// Width of the rendered bar in cells.
pub const BAR_WIDTH: usize = 40;
/// Buckets are anomalous above mean + 2 standard deviations.
pub const ANOMALY_SIGMA: f64 = 2.0;

// Canonical bucket sizes, ascending: 1s, 1m, 5m, 15m, 1h, 6h, 1d, 1w, 30d.
const CANONICAL_SIZES_SECS: [i64; 9] = [1, 60, 300, 900, 3_600, 21_600, 86_400, 604_800, 2_592_000];

/// Pick the largest canonical bucket size not exceeding `span / target`.
/// Sub-second spans use one second; the result is never zero.
pub fn calculate_bucket_size(min: DateTime<Utc>, max: DateTime<Utc>, target: usize) -> Duration {
    let span = (max - min).num_seconds().max(0);
    let limit = span / target.max(1) as i64;
    let mut size = CANONICAL_SIZES_SECS[0];
    for &candidate in &CANONICAL_SIZES_SECS {
        if candidate <= limit {
            size = candidate;
        }
    }
    Duration::seconds(size)
}

#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
}

/// A bucket whose count exceeds the anomaly cut, with its deviation
/// in standard deviations rounded to one decimal.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub bucket_start: DateTime<Utc>,
    pub count: usize,
    pub deviation: String,
}

#[derive(Debug, Clone)]
pub struct TimeHistogram {
    pub buckets: Vec<Bucket>,
    pub bucket_size: Duration,
}

impl TimeHistogram {
    /// Build a histogram over `timestamps` with the given bucket size.
    /// The first bucket is aligned to the floor of the earliest
    /// timestamp to a multiple of the size; buckets run contiguously
    /// through the one containing the latest timestamp. Returns None
    /// for an empty series.
    pub fn build(timestamps: &[DateTime<Utc>], bucket_size: Duration) -> Option<Self> {
        let min = timestamps.iter().min()?.timestamp();
        let max = timestamps.iter().max()?.timestamp();
        let size = bucket_size.num_seconds().max(1);
        let first = min.div_euclid(size) * size;
        let last_index = ((max - first).div_euclid(size)) as usize;

        let mut buckets = Vec::with_capacity(last_index + 1);
        for i in 0..=last_index {
            let start_secs = first + i as i64 * size;
            buckets.push(Bucket {
                start: DateTime::from_timestamp(start_secs, 0)?,
                end: DateTime::from_timestamp(start_secs + size, 0)?,
                count: 0,
            });
        }
        for ts in timestamps {
            let index = ((ts.timestamp() - first).div_euclid(size)) as usize;
            if let Some(bucket) = buckets.get_mut(index) {
                bucket.count += 1;
            }
        }
        Some(Self {
            buckets,
            bucket_size: Duration::seconds(size),
        })
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum()
    }

    /// Buckets with `count > mean + 2 sigma`, using the population
    /// standard deviation of bucket counts.
    pub fn anomalies(&self) -> Vec<Anomaly> {
        let n = self.buckets.len();
        if n == 0 {
            return Vec::new();
        }
        let mean = self.total() as f64 / n as f64;
        let variance = self
            .buckets
            .iter()
            .map(|b| {
                let d = b.count as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;
        let sigma = variance.sqrt();
        if sigma == 0.0 {
            return Vec::new();
        }
        let cut = mean + ANOMALY_SIGMA * sigma;
        self.buckets
            .iter()
            .filter(|b| (b.count as f64) > cut)
            .map(|b| Anomaly {
                bucket_start: b.start,
                count: b.count,
                deviation: format!("{:.1}σ", (b.count as f64 - mean) / sigma),
            })
            .collect()
    }

    /// One line per bucket: local ISO time, a bar delimiter, a 40-cell
    /// bar of solid and light blocks proportional to the count, then
    /// the count itself.
    pub fn render_ascii(&self) -> String {
        let max_count = self.buckets.iter().map(|b| b.count).max().unwrap_or(0);
        let mut out = String::new();
        for bucket in &self.buckets {
            let filled = if max_count == 0 {
                0
            } else {
                let ratio = bucket.count as f64 / max_count as f64;
                ((ratio * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH)
            };
            let mut bar = "█".repeat(filled);
            bar.push_str(&"░".repeat(BAR_WIDTH - filled));
            out.push_str(&format!(
                "{} | {} {}\n",
                bucket.start.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                bar,
                bucket.count
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_bucket_size_for_one_hour_span() {
        // span/20 = 3 minutes; the largest canonical size below that
        // is one minute.
        let size = calculate_bucket_size(ts(12, 0, 0), ts(13, 0, 0), TARGET_BUCKETS);
        assert_eq!(size, Duration::minutes(1));
    }

    #[test]
    fn test_bucket_size_floor_is_one_second() {
        let size = calculate_bucket_size(ts(12, 0, 0), ts(12, 0, 0), TARGET_BUCKETS);
        assert_eq!(size, Duration::seconds(1));
    }

    #[test]
    fn test_bucket_size_large_span() {
        // 40 days / 20 = 2 days; largest canonical below is 1 day.
        let min = ts(0, 0, 0);
        let max = min + Duration::days(40);
        assert_eq!(
            calculate_bucket_size(min, max, TARGET_BUCKETS),
            Duration::days(1)
        );
    }

    #[test]
    fn test_histogram_coverage() {
        let timestamps: Vec<_> = (0..90).map(|i| ts(12, i / 3, (i % 3) * 20)).collect();
        let hist = TimeHistogram::build(&timestamps, Duration::minutes(5)).unwrap();
        assert_eq!(hist.total(), timestamps.len());
        // First bucket aligned to a multiple of five minutes.
        assert_eq!(hist.buckets[0].start, ts(12, 0, 0));
        for pair in hist.buckets.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_histogram_alignment_floors_min() {
        let timestamps = vec![ts(12, 7, 30), ts(12, 8, 10)];
        let hist = TimeHistogram::build(&timestamps, Duration::minutes(5)).unwrap();
        assert_eq!(hist.buckets[0].start, ts(12, 5, 0));
        assert_eq!(hist.buckets.len(), 1);
        assert_eq!(hist.buckets[0].count, 2);
    }

    #[test]
    fn test_empty_series() {
        assert!(TimeHistogram::build(&[], Duration::minutes(1)).is_none());
    }

    #[test]
    fn test_anomaly_detection() {
        // 19 quiet minutes and one spike.
        let mut timestamps = Vec::new();
        for minute in 0..20 {
            let per_bucket = if minute == 7 { 50 } else { 2 };
            for i in 0..per_bucket {
                timestamps.push(ts(12, minute, (i % 60) as u32));
            }
        }
        let hist = TimeHistogram::build(&timestamps, Duration::minutes(1)).unwrap();
        let anomalies = hist.anomalies();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].bucket_start, ts(12, 7, 0));
        assert_eq!(anomalies[0].count, 50);
        assert!(anomalies[0].deviation.ends_with('σ'));
    }

    #[test]
    fn test_no_anomalies_when_uniform() {
        let timestamps: Vec<_> = (0..10).map(|i| ts(12, i, 0)).collect();
        let hist = TimeHistogram::build(&timestamps, Duration::minutes(1)).unwrap();
        assert!(hist.anomalies().is_empty());
    }

    #[test]
    fn test_ascii_bar_shape() {
        let timestamps = vec![ts(12, 0, 0), ts(12, 0, 1), ts(12, 1, 0)];
        let hist = TimeHistogram::build(&timestamps, Duration::minutes(1)).unwrap();
        let rendered = hist.render_ascii();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let cells = line.chars().filter(|c| *c == '█' || *c == '░').count();
            assert_eq!(cells, BAR_WIDTH);
        }
        // The fuller bucket renders a fully solid bar.
        assert_eq!(lines[0].chars().filter(|c| *c == '█').count(), BAR_WIDTH);
        assert!(lines[0].trim_end().ends_with('2'));
        assert!(lines[1].trim_end().ends_with('1'));
    }
}
