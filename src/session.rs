/// Process-lifetime session cache and the streaming ingest pass
use crate::cluster_config::ClusterParams;
use crate::clusterer::{Cluster, Clusterer};
use crate::line_pattern::LinePattern;
use crate::timestamp_detector::{detect_format, TimestampPattern, DETECTION_SAMPLE};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// Completed ingest passes kept in memory at once.
pub const SESSION_CACHE_CAPACITY: usize = 32;

/// Open a file for line streaming. Missing files get the canonical
/// not-found message; other I/O failures carry their own message.
pub async fn open_lines(path: &str) -> Result<Lines<BufReader<File>>> {
    match File::open(path).await {
        Ok(file) => Ok(BufReader::new(file).lines()),
        Err(e) if e.kind() == ErrorKind::NotFound => bail!("File not found: {path}"),
        Err(e) => bail!("Failed to read {path}: {e}"),
    }
}

/// Cache key: file identity is the caller-supplied path. The threshold
/// enters as its bit pattern so the key stays hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    path: String,
    max_clusters: usize,
    threshold_bits: u64,
    filter: Option<String>,
}

impl SessionKey {
    pub fn new(path: &str, params: ClusterParams, filter: Option<&str>) -> Self {
        Self {
            path: path.to_string(),
            max_clusters: params.max_clusters,
            threshold_bits: params.threshold.to_bits(),
            filter: filter.map(str::to_string),
        }
    }
}

/// The result of one complete ingest pass over a file.
#[derive(Debug)]
pub struct SessionData {
    pub total_lines: usize,
    pub clusterer: Clusterer,
    pub timestamps: Vec<DateTime<Utc>>,
    pub format: Option<TimestampPattern>,
}

/// Memo of completed passes. Never invalidated on file change; a
/// `force_refresh` load bypasses and overwrites an entry.
pub struct SessionCache {
    entries: LruCache<SessionKey, Arc<SessionData>, BuildHasherDefault<FxHasher>>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::with_hasher(capacity, BuildHasherDefault::default()),
        }
    }

    pub fn get(&mut self, key: &SessionKey) -> Option<Arc<SessionData>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: SessionKey, data: Arc<SessionData>) {
        self.entries.put(key, data);
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(SESSION_CACHE_CAPACITY)
    }
}

/// Load a session from the cache or run a fresh ingest pass.
///
/// The cache is only written after a pass runs to completion, so an
/// interrupted load never leaves a partial entry behind.
pub async fn load_session(
    cache: &mut SessionCache,
    path: &str,
    params: ClusterParams,
    filter: Option<&str>,
    force_refresh: bool,
) -> Result<Arc<SessionData>> {
    let key = SessionKey::new(path, params, filter);
    if !force_refresh {
        if let Some(data) = cache.get(&key) {
            tracing::debug!(path, "session cache hit");
            return Ok(data);
        }
    }
    let pattern = filter.map(LinePattern::parse).transpose()?;
    let data = Arc::new(ingest(path, params, pattern.as_ref()).await?);
    cache.insert(key, data.clone());
    Ok(data)
}

/// Stream the file once, in order: buffer the detection sample, infer
/// the timestamp format, then feed every line through the filter and
/// the clusterer. Only the sample is ever held in memory.
async fn ingest(
    path: &str,
    params: ClusterParams,
    filter: Option<&LinePattern>,
) -> Result<SessionData> {
    let mut lines = open_lines(path).await?;

    let mut sample: Vec<String> = Vec::with_capacity(DETECTION_SAMPLE);
    while sample.len() < DETECTION_SAMPLE {
        match lines.next_line().await? {
            Some(line) => sample.push(line),
            None => break,
        }
    }
    let format = detect_format(&sample);

    let mut clusterer = Clusterer::new(params);
    let mut timestamps = Vec::new();
    let mut total_lines = 0usize;

    for line in &sample {
        total_lines += 1;
        admit(line, filter, format, &mut clusterer, &mut timestamps);
    }
    while let Some(line) = lines.next_line().await? {
        total_lines += 1;
        admit(&line, filter, format, &mut clusterer, &mut timestamps);
    }

    tracing::info!(
        path,
        total_lines,
        clusters = clusterer.len(),
        format = format.map(|f| f.name()).unwrap_or("none"),
        "ingest pass complete"
    );
    Ok(SessionData {
        total_lines,
        clusterer,
        timestamps,
        format,
    })
}

fn admit(
    line: &str,
    filter: Option<&LinePattern>,
    format: Option<TimestampPattern>,
    clusterer: &mut Clusterer,
    timestamps: &mut Vec<DateTime<Utc>>,
) {
    if let Some(pattern) = filter {
        if !pattern.matches(line) {
            return;
        }
    }
    let ts = format.and_then(|f| f.extract(line));
    if let Some(ts) = ts {
        timestamps.push(ts);
    }
    clusterer.add(line, ts);
}

/// Drill-down re-scan: stream the file again and offer to a fresh
/// sub-clusterer every line that membership-matches the parent.
pub async fn drill_pass(
    path: &str,
    parent: &Cluster,
    format: Option<TimestampPattern>,
    params: ClusterParams,
) -> Result<Clusterer> {
    let mut lines = open_lines(path).await?;
    let mut sub = Clusterer::new(params);
    while let Some(line) = lines.next_line().await? {
        if !parent.is_member(&line) {
            continue;
        }
        let ts = format.and_then(|f| f.extract(&line));
        sub.add(&line, ts);
    }
    tracing::debug!(
        parent = parent.id,
        subclusters = sub.len(),
        "drill-down pass complete"
    );
    Ok(sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn corpus(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_ingest_counts_and_clusters() {
        let file = corpus(&[
            "2024-03-01 10:00:00 INFO worker 1 ready",
            "2024-03-01 10:00:01 INFO worker 2 ready",
            "2024-03-01 10:00:02 INFO worker 3 ready",
        ]);
        let mut cache = SessionCache::default();
        let path = file.path().to_str().unwrap().to_string();
        let session = load_session(&mut cache, &path, ClusterParams::default(), None, false)
            .await
            .unwrap();
        assert_eq!(session.total_lines, 3);
        assert_eq!(session.clusterer.len(), 1);
        assert_eq!(session.timestamps.len(), 3);
        assert_eq!(session.format, Some(crate::timestamp_detector::TimestampPattern::Iso8601));
    }

    #[tokio::test]
    async fn test_cache_reuse_and_force_refresh() {
        let file = corpus(&["plain line one", "plain line two"]);
        let path = file.path().to_str().unwrap().to_string();
        let mut cache = SessionCache::default();
        let first = load_session(&mut cache, &path, ClusterParams::default(), None, false)
            .await
            .unwrap();
        let second = load_session(&mut cache, &path, ClusterParams::default(), None, false)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let refreshed = load_session(&mut cache, &path, ClusterParams::default(), None, true)
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[tokio::test]
    async fn test_distinct_params_are_distinct_sessions() {
        let file = corpus(&["plain line one", "plain line two"]);
        let path = file.path().to_str().unwrap().to_string();
        let mut cache = SessionCache::default();
        let defaults = load_session(&mut cache, &path, ClusterParams::default(), None, false)
            .await
            .unwrap();
        let strict = load_session(
            &mut cache,
            &path,
            ClusterParams::new().with_threshold(0.8),
            None,
            false,
        )
        .await
        .unwrap();
        assert!(!Arc::ptr_eq(&defaults, &strict));
    }

    #[tokio::test]
    async fn test_filter_excludes_lines_from_counts() {
        let file = corpus(&[
            "ERROR disk failing on bay 2",
            "INFO routine sweep done",
            "ERROR disk failing on bay 7",
        ]);
        let path = file.path().to_str().unwrap().to_string();
        let mut cache = SessionCache::default();
        let session = load_session(
            &mut cache,
            &path,
            ClusterParams::default(),
            Some("ERROR"),
            false,
        )
        .await
        .unwrap();
        // Every line is scanned but only matching lines are admitted.
        assert_eq!(session.total_lines, 3);
        assert_eq!(session.clusterer.total_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let file = corpus(&[]);
        let path = file.path().to_str().unwrap().to_string();
        let mut cache = SessionCache::default();
        let session = load_session(&mut cache, &path, ClusterParams::default(), None, false)
            .await
            .unwrap();
        assert_eq!(session.total_lines, 0);
        assert!(session.clusterer.is_empty());
        assert!(session.timestamps.is_empty());
        assert!(session.format.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_error() {
        let mut cache = SessionCache::default();
        let err = load_session(
            &mut cache,
            "/no/such/file.log",
            ClusterParams::default(),
            None,
            false,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("File not found:"));
    }
}
