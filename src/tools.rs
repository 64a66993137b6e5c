/// The six-tool exploration surface. Every tool takes a structured
/// argument object and returns a JSON document; failures come back as
/// `{ "error": ... }` rather than being raised, and never outlive the
/// invocation that produced them.
use crate::cluster_config::{ClusterParams, DEFAULT_MAX_SUBCLUSTERS};
use crate::clusterer::ClusterView;
use crate::histogram::{calculate_bucket_size, TimeHistogram, TARGET_BUCKETS};
use crate::line_pattern::LinePattern;
use crate::session::{drill_pass, load_session, open_lines, SessionCache, SessionData};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;

fn default_max_clusters() -> usize {
    crate::cluster_config::DEFAULT_MAX_CLUSTERS
}

fn default_threshold() -> f64 {
    crate::cluster_config::DEFAULT_THRESHOLD
}

fn default_max_subclusters() -> usize {
    DEFAULT_MAX_SUBCLUSTERS
}

fn default_max_examples() -> usize {
    5
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct OverviewArgs {
    pub file: String,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClusterArgs {
    pub file: String,
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClusterDrillArgs {
    pub file: String,
    pub cluster_id: u64,
    #[serde(default = "default_max_subclusters")]
    pub max_subclusters: usize,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BucketSize {
    #[default]
    Auto,
    Minute,
    Hour,
    Day,
}

#[derive(Debug, Deserialize)]
pub struct TimelineArgs {
    pub file: String,
    #[serde(default)]
    pub cluster_id: Option<u64>,
    #[serde(default)]
    pub bucket_size: BucketSize,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct GrepArgs {
    pub file: String,
    pub pattern: String,
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
    #[serde(default)]
    pub context_lines: usize,
}

#[derive(Debug, Deserialize)]
pub struct FetchArgs {
    pub file: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Tool dispatcher owning the session cache. One instance lives for
/// the whole process; handlers borrow it exclusively, matching the
/// single-threaded cooperative execution model.
pub struct LogExplorer {
    cache: SessionCache,
}

impl Default for LogExplorer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogExplorer {
    pub fn new() -> Self {
        Self {
            cache: SessionCache::default(),
        }
    }

    /// Dispatch a tool call by name with raw JSON arguments.
    pub async fn handle(&mut self, tool: &str, args: Value) -> Value {
        match tool {
            "overview" => match serde_json::from_value(args) {
                Ok(args) => self.overview(args).await,
                Err(e) => invalid_args(e),
            },
            "cluster" => match serde_json::from_value(args) {
                Ok(args) => self.cluster(args).await,
                Err(e) => invalid_args(e),
            },
            "cluster_drill" => match serde_json::from_value(args) {
                Ok(args) => self.cluster_drill(args).await,
                Err(e) => invalid_args(e),
            },
            "timeline" => match serde_json::from_value(args) {
                Ok(args) => self.timeline(args).await,
                Err(e) => invalid_args(e),
            },
            "grep" => match serde_json::from_value(args) {
                Ok(args) => self.grep(args).await,
                Err(e) => invalid_args(e),
            },
            "fetch" => match serde_json::from_value(args) {
                Ok(args) => self.fetch(args).await,
                Err(e) => invalid_args(e),
            },
            other => json!({ "error": format!("Unknown tool: {other}") }),
        }
    }

    pub async fn overview(&mut self, args: OverviewArgs) -> Value {
        self.overview_inner(args).await.unwrap_or_else(into_error)
    }

    pub async fn cluster(&mut self, args: ClusterArgs) -> Value {
        self.cluster_inner(args).await.unwrap_or_else(into_error)
    }

    pub async fn cluster_drill(&mut self, args: ClusterDrillArgs) -> Value {
        self.cluster_drill_inner(args).await.unwrap_or_else(into_error)
    }

    pub async fn timeline(&mut self, args: TimelineArgs) -> Value {
        self.timeline_inner(args).await.unwrap_or_else(into_error)
    }

    pub async fn grep(&mut self, args: GrepArgs) -> Value {
        self.grep_inner(args).await.unwrap_or_else(into_error)
    }

    pub async fn fetch(&mut self, args: FetchArgs) -> Value {
        self.fetch_inner(args).await.unwrap_or_else(into_error)
    }

    async fn overview_inner(&mut self, args: OverviewArgs) -> Result<Value> {
        let size_bytes = file_size(&args.file).await?;
        let session = self.default_session(&args.file, args.force_refresh).await?;
        Ok(json!({
            "file": args.file,
            "size_bytes": size_bytes,
            "size_human": format_bytes(size_bytes),
            "total_lines": session.total_lines,
            "timestamp_format": session.format.map(|f| f.name()),
            "time_range": time_range_json(&session.timestamps),
        }))
    }

    async fn cluster_inner(&mut self, args: ClusterArgs) -> Result<Value> {
        let params = ClusterParams::new()
            .with_max_clusters(args.max_clusters)
            .with_threshold(args.threshold);
        let session = load_session(
            &mut self.cache,
            &args.file,
            params,
            args.filter.as_deref(),
            args.force_refresh,
        )
        .await?;
        tracing::info!(
            file = %args.file,
            clusters = session.clusterer.len(),
            "cluster pass served"
        );
        Ok(json!({
            "file": args.file,
            "total_lines": session.total_lines,
            "clusters": cluster_rows(session.clusterer.stats()),
        }))
    }

    async fn cluster_drill_inner(&mut self, args: ClusterDrillArgs) -> Result<Value> {
        let session = self.default_session(&args.file, args.force_refresh).await?;
        let parent = session
            .clusterer
            .get(args.cluster_id)
            .ok_or_else(|| anyhow!("Unknown cluster id: {}", args.cluster_id))?;
        let sub = drill_pass(
            &args.file,
            parent,
            session.format,
            ClusterParams::drill_down(args.max_subclusters),
        )
        .await?;
        Ok(json!({
            "file": args.file,
            "parent": {
                "id": parent.id,
                "template": parent.template.pattern,
                "count": parent.count,
            },
            "subclusters": cluster_rows(sub.stats()),
        }))
    }

    async fn timeline_inner(&mut self, args: TimelineArgs) -> Result<Value> {
        let session = self.default_session(&args.file, args.force_refresh).await?;
        if session.format.is_none() {
            bail!("No timestamp format detected in {}", args.file);
        }
        let timestamps: &[DateTime<Utc>] = match args.cluster_id {
            Some(id) => {
                let cluster = session
                    .clusterer
                    .get(id)
                    .ok_or_else(|| anyhow!("Unknown cluster id: {id}"))?;
                &cluster.timestamps
            }
            None => &session.timestamps,
        };
        let (min, max) = match (timestamps.iter().min(), timestamps.iter().max()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => bail!("No timestamps available for the requested scope"),
        };
        let bucket_size = match args.bucket_size {
            BucketSize::Auto => calculate_bucket_size(min, max, TARGET_BUCKETS),
            BucketSize::Minute => Duration::minutes(1),
            BucketSize::Hour => Duration::hours(1),
            BucketSize::Day => Duration::days(1),
        };
        let hist = TimeHistogram::build(timestamps, bucket_size)
            .ok_or_else(|| anyhow!("No timestamps available for the requested scope"))?;
        Ok(json!({
            "file": args.file,
            "cluster_id": args.cluster_id,
            "bucket_seconds": hist.bucket_size.num_seconds(),
            "time_range": time_range_json(timestamps),
            "buckets": hist.buckets,
            "visualization": hist.render_ascii(),
            "anomalies": hist.anomalies(),
        }))
    }

    async fn grep_inner(&mut self, args: GrepArgs) -> Result<Value> {
        let pattern = LinePattern::parse(&args.pattern)?;
        let mut lines = open_lines(&args.file).await?;

        struct Hit {
            line_number: usize,
            line: String,
            before: Vec<String>,
            after: Vec<String>,
            pending_after: usize,
        }

        let mut recent: VecDeque<String> = VecDeque::new();
        let mut hits: Vec<Hit> = Vec::new();
        let mut total_matches = 0usize;
        let mut line_number = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            for hit in hits.iter_mut() {
                if hit.pending_after > 0 {
                    hit.after.push(line.clone());
                    hit.pending_after -= 1;
                }
            }
            if pattern.matches(&line) {
                total_matches += 1;
                if hits.len() < args.max_examples {
                    hits.push(Hit {
                        line_number,
                        line: line.clone(),
                        before: recent.iter().cloned().collect(),
                        after: Vec::new(),
                        pending_after: args.context_lines,
                    });
                }
            }
            if args.context_lines > 0 {
                recent.push_back(line);
                if recent.len() > args.context_lines {
                    recent.pop_front();
                }
            }
        }

        let shown = hits.len();
        let examples: Vec<Value> = hits
            .into_iter()
            .map(|hit| {
                if args.context_lines > 0 {
                    json!({
                        "line_number": hit.line_number,
                        "line": hit.line,
                        "before": hit.before,
                        "after": hit.after,
                    })
                } else {
                    json!({ "line_number": hit.line_number, "line": hit.line })
                }
            })
            .collect();

        let mut result = json!({
            "file": args.file,
            "pattern": args.pattern,
            "total_matches": total_matches,
            "examples": examples,
        });
        if total_matches > shown {
            result["hint"] = json!(format!(
                "Showing {shown} of {total_matches} matches; use fetch with a filter to page through the rest"
            ));
        }
        Ok(result)
    }

    async fn fetch_inner(&mut self, args: FetchArgs) -> Result<Value> {
        let pattern = args.filter.as_deref().map(LinePattern::parse).transpose()?;
        let mut lines = open_lines(&args.file).await?;

        let mut matched = 0usize;
        let mut line_number = 0usize;
        let mut out: Vec<Value> = Vec::new();

        if args.limit > 0 {
            while let Some(line) = lines.next_line().await? {
                line_number += 1;
                let is_match = pattern.as_ref().map_or(true, |p| p.matches(&line));
                if !is_match {
                    continue;
                }
                matched += 1;
                if matched > args.offset {
                    out.push(json!({ "line_number": line_number, "line": line }));
                }
                // Scanning stops with the window; total_scanned counts
                // matches observed up to and including it.
                if out.len() == args.limit {
                    break;
                }
            }
        }

        Ok(json!({
            "file": args.file,
            "filter": args.filter,
            "offset": args.offset,
            "limit": args.limit,
            "lines": out,
            "total_scanned": matched,
        }))
    }

    async fn default_session(&mut self, file: &str, force_refresh: bool) -> Result<Arc<SessionData>> {
        load_session(
            &mut self.cache,
            file,
            ClusterParams::default(),
            None,
            force_refresh,
        )
        .await
    }
}

fn invalid_args(e: serde_json::Error) -> Value {
    json!({ "error": format!("Invalid arguments: {e}") })
}

fn into_error(e: anyhow::Error) -> Value {
    json!({ "error": e.to_string() })
}

fn cluster_rows(views: Vec<ClusterView>) -> Vec<Value> {
    views
        .into_iter()
        .map(|view| {
            json!({
                "id": view.id,
                "count": view.count,
                "percent": format!("{:.1}%", view.percent),
                "template": view.template,
                "examples": view.examples.into_iter().take(3).collect::<Vec<String>>(),
            })
        })
        .collect()
}

async fn file_size(path: &str) -> Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => bail!("File not found: {path}"),
        Err(e) => bail!("Failed to read {path}: {e}"),
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_duration(duration: Duration) -> String {
    let mut secs = duration.num_seconds().max(0);
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

fn time_range_json(timestamps: &[DateTime<Utc>]) -> Value {
    match (timestamps.iter().min(), timestamps.iter().max()) {
        (Some(min), Some(max)) => json!({
            "start": min.to_rfc3339(),
            "end": max.to_rfc3339(),
            "duration": format_duration(*max - *min),
        }),
        _ => Value::Null,
    }
}
