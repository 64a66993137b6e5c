/// Detects the dominant timestamp format of a log file and extracts
/// instants from lines
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Lines sampled for format detection.
pub const DETECTION_SAMPLE: usize = 100;
/// A recognizer must parse more than half the sample to be selected.
pub const DETECTION_CONFIDENCE: f64 = 0.5;

static ISO8601_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{4})-(\d{2})-(\d{2})[T ](\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,9}))?(Z|[+-]\d{2}:\d{2})?",
    )
    .unwrap()
});

static CLF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(\d{2})/([A-Z][a-z]{2})/(\d{4}):(\d{2}):(\d{2}):(\d{2}) ([+-])(\d{2})(\d{2})\]")
        .unwrap()
});

static SYSLOG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z][a-z]{2})\s+(\d{1,2})\s+(\d{2}):(\d{2}):(\d{2})").unwrap());

static SIMPLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2})").unwrap());

// Epoch windows start at 1.4e9 (ms: 1.4e12) so request ids and port
// numbers do not collide with them.
static EPOCH_MS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[4-9]\d{11})\b").unwrap());

static EPOCH_S_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[4-9]\d{8})\b").unwrap());

static BRACKET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,9}))?\]").unwrap()
});

/// The recognizer catalogue. A closed set, so each variant pairs an
/// explicit matcher with an explicit parser instead of going through
/// trait objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPattern {
    Iso8601,
    Clf,
    Syslog,
    Simple,
    EpochMillis,
    EpochSeconds,
    Bracket,
}

impl TimestampPattern {
    /// Detection tries recognizers in this order; ties go to the
    /// earlier entry.
    pub const CATALOGUE: [TimestampPattern; 7] = [
        TimestampPattern::Iso8601,
        TimestampPattern::Clf,
        TimestampPattern::Syslog,
        TimestampPattern::Simple,
        TimestampPattern::EpochMillis,
        TimestampPattern::EpochSeconds,
        TimestampPattern::Bracket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TimestampPattern::Iso8601 => "iso8601",
            TimestampPattern::Clf => "clf",
            TimestampPattern::Syslog => "syslog",
            TimestampPattern::Simple => "simple",
            TimestampPattern::EpochMillis => "epoch_ms",
            TimestampPattern::EpochSeconds => "epoch_s",
            TimestampPattern::Bracket => "bracket",
        }
    }

    /// Extract an instant from a line, or None on no match or an
    /// ill-formed date. Zoneless timestamps are read as UTC; explicit
    /// offsets are honored and converted.
    pub fn extract(self, line: &str) -> Option<DateTime<Utc>> {
        match self {
            TimestampPattern::Iso8601 => parse_iso8601(line),
            TimestampPattern::Clf => parse_clf(line),
            TimestampPattern::Syslog => parse_syslog(line),
            TimestampPattern::Simple => parse_simple(line),
            TimestampPattern::EpochMillis => parse_epoch_ms(line),
            TimestampPattern::EpochSeconds => parse_epoch_s(line),
            TimestampPattern::Bracket => parse_bracket(line),
        }
    }
}

/// Pick the recognizer with the highest share of parseable lines in
/// the sample, requiring strictly more than half. Once a format is
/// detected it is never re-evaluated; lines that fail to parse later
/// simply yield no timestamp.
pub fn detect_format<S: AsRef<str>>(sample: &[S]) -> Option<TimestampPattern> {
    if sample.is_empty() {
        return None;
    }
    let mut best: Option<(TimestampPattern, f64)> = None;
    for pattern in TimestampPattern::CATALOGUE {
        let valid = sample
            .iter()
            .filter(|line| pattern.extract(line.as_ref()).is_some())
            .count();
        let confidence = valid as f64 / sample.len() as f64;
        if best.map_or(true, |(_, top)| confidence > top) {
            best = Some((pattern, confidence));
        }
    }
    best.filter(|&(_, confidence)| confidence > DETECTION_CONFIDENCE)
        .map(|(pattern, _)| pattern)
}

fn month_number(abbrev: &str) -> Option<u32> {
    Some(match abbrev {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    })
}

fn frac_nanos(digits: &str) -> u32 {
    let mut padded = String::with_capacity(9);
    padded.push_str(&digits[..digits.len().min(9)]);
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().unwrap_or(0)
}

fn naive(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    nanos: u32,
) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)?;
    Some(NaiveDateTime::new(date, time))
}

fn parse_iso8601(line: &str) -> Option<DateTime<Utc>> {
    let caps = ISO8601_RE.captures(line)?;
    let nanos = caps.get(7).map_or(0, |m| frac_nanos(m.as_str()));
    let dt = naive(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
        caps[5].parse().ok()?,
        caps[6].parse().ok()?,
        nanos,
    )?;
    match caps.get(8).map(|m| m.as_str()) {
        None | Some("Z") => Some(Utc.from_utc_datetime(&dt)),
        Some(offset) => {
            let sign = if offset.starts_with('-') { -1 } else { 1 };
            let hours: i32 = offset[1..3].parse().ok()?;
            let minutes: i32 = offset[4..6].parse().ok()?;
            let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
            offset
                .from_local_datetime(&dt)
                .single()
                .map(|t| t.with_timezone(&Utc))
        }
    }
}

fn parse_clf(line: &str) -> Option<DateTime<Utc>> {
    let caps = CLF_RE.captures(line)?;
    let dt = naive(
        caps[3].parse().ok()?,
        month_number(&caps[2])?,
        caps[1].parse().ok()?,
        caps[4].parse().ok()?,
        caps[5].parse().ok()?,
        caps[6].parse().ok()?,
        0,
    )?;
    let sign = if &caps[7] == "-" { -1 } else { 1 };
    let hours: i32 = caps[8].parse().ok()?;
    let minutes: i32 = caps[9].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
    offset
        .from_local_datetime(&dt)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

// The year is taken from the wall clock once per extraction; logs that
// cross a year boundary mid-ingest may split across years.
fn parse_syslog(line: &str) -> Option<DateTime<Utc>> {
    let caps = SYSLOG_RE.captures(line)?;
    let dt = naive(
        Utc::now().year(),
        month_number(&caps[1])?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
        caps[5].parse().ok()?,
        0,
    )?;
    Some(Utc.from_utc_datetime(&dt))
}

fn parse_simple(line: &str) -> Option<DateTime<Utc>> {
    let caps = SIMPLE_RE.captures(line)?;
    let dt = naive(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
        caps[5].parse().ok()?,
        caps[6].parse().ok()?,
        0,
    )?;
    Some(Utc.from_utc_datetime(&dt))
}

fn parse_epoch_ms(line: &str) -> Option<DateTime<Utc>> {
    let caps = EPOCH_MS_RE.captures(line)?;
    let millis: i64 = caps[1].parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn parse_epoch_s(line: &str) -> Option<DateTime<Utc>> {
    let caps = EPOCH_S_RE.captures(line)?;
    let seconds: i64 = caps[1].parse().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

fn parse_bracket(line: &str) -> Option<DateTime<Utc>> {
    let caps = BRACKET_RE.captures(line)?;
    let nanos = caps.get(7).map_or(0, |m| frac_nanos(m.as_str()));
    let dt = naive(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
        caps[5].parse().ok()?,
        caps[6].parse().ok()?,
        nanos,
    )?;
    Some(Utc.from_utc_datetime(&dt))
}
