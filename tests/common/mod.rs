#![allow(dead_code)]
//! Synthetic corpus generation shared by the integration suites.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use tempfile::NamedTempFile;

/// Write lines to a temp file, one per line, and return the handle.
pub fn write_corpus<S: AsRef<str>>(lines: &[S]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line.as_ref()).unwrap();
    }
    file.flush().unwrap();
    file
}

pub fn path_of(file: &NamedTempFile) -> String {
    file.path().to_str().unwrap().to_string()
}

/// A mixed corpus: one steady INFO population plus three ERROR
/// populations sharing a common prefix, 30 error lines total.
pub fn three_error_populations() -> Vec<String> {
    let mut lines = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    for n in 100..110 {
        errors.push(format!(
            "ERROR request failed: database timeout after {n}ms"
        ));
        errors.push(format!(
            "ERROR request failed: upstream returned 503 for host{n}"
        ));
        errors.push(format!(
            "ERROR request failed: cache miss for key session{n}"
        ));
    }
    let mut next_error = errors.into_iter();
    for i in 0..1000u32 {
        // Sprinkle the 30 errors evenly through the stream.
        if i % 33 == 0 {
            if let Some(err) = next_error.next() {
                lines.push(err);
                continue;
            }
        }
        lines.push(format!("INFO served page {} in {} ms", i, (i * 7) % 90 + 1));
    }
    lines
}

pub const SPIKE_BASE_HOUR: u32 = 12;
pub const SPIKE_START_MINUTE: i64 = 60;
pub const SPIKE_END_MINUTE: i64 = 75;

pub fn spike_base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, SPIKE_BASE_HOUR, 0, 0).unwrap()
}

/// Two hours of logs: five INFO lines per minute, one ERROR per
/// minute, and a 10x ERROR spike over minutes 60 to 75.
///
/// Totals: 600 INFO lines, 255 ERROR lines.
pub fn spiky_corpus() -> Vec<String> {
    let base = spike_base();
    let mut rng = StdRng::seed_from_u64(42);
    let mut lines = Vec::new();
    for minute in 0..120i64 {
        for i in 0..5 {
            let ts = base + Duration::minutes(minute) + Duration::seconds(rng.gen_range(0..60));
            lines.push(format!(
                "{} INFO scheduler heartbeat queue depth nominal seq {}",
                ts.format("%Y-%m-%d %H:%M:%S"),
                minute * 5 + i
            ));
        }
        let error_count = if (SPIKE_START_MINUTE..SPIKE_END_MINUTE).contains(&minute) {
            10
        } else {
            1
        };
        for _ in 0..error_count {
            let ts = base + Duration::minutes(minute) + Duration::seconds(rng.gen_range(0..60));
            lines.push(format!(
                "{} ERROR gateway connection timeout retrying upstream call {}",
                ts.format("%Y-%m-%d %H:%M:%S"),
                rng.gen_range(1000..9999)
            ));
        }
    }
    lines
}

pub const SPIKY_INFO_LINES: usize = 600;
pub const SPIKY_ERROR_LINES: usize = 255;
