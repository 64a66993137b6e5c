/// Online bounded clustering of log lines by template similarity
use crate::cluster_config::ClusterParams;
use crate::template_engine::{merge_with_template, Template, TemplateUpdate};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw lines retained per cluster, first admitted at index 0.
pub const MAX_EXAMPLES: usize = 5;

/// Similarity floor for drill-down membership. Part of the external
/// contract: a line belongs to a parent cluster for re-scan purposes
/// iff its merge similarity is at least this value.
pub const MEMBERSHIP_FLOOR: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: u64,
    pub template: Template,
    pub count: usize,
    pub examples: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl Cluster {
    fn open(id: u64, line: &str, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            template: Template::from_line(line),
            count: 1,
            examples: vec![line.to_string()],
            timestamps: timestamp.into_iter().collect(),
        }
    }

    /// Merge similarity of `line` against this cluster's template.
    pub fn similarity(&self, line: &str) -> f64 {
        merge_with_template(&self.template, line).similarity
    }

    /// Drill-down membership test against the 0.4 floor.
    pub fn is_member(&self, line: &str) -> bool {
        self.similarity(line) >= MEMBERSHIP_FLOOR
    }
}

/// One row of a cluster report, percent rounded to one decimal.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub id: u64,
    pub count: usize,
    pub percent: f64,
    pub template: String,
    pub examples: Vec<String>,
}

/// Single-pass clusterer with bounded capacity.
///
/// Each incoming line is admitted into the cluster with the highest
/// merge similarity when that similarity reaches the threshold, not
/// into the first cluster above it; otherwise a new cluster opens,
/// evicting the least-populated cluster first when full. Ids are
/// dense, monotone, and never reused.
#[derive(Debug)]
pub struct Clusterer {
    threshold: f64,
    max_clusters: usize,
    next_id: u64,
    clusters: Vec<Cluster>,
}

impl Clusterer {
    pub fn new(params: ClusterParams) -> Self {
        Self {
            threshold: params.threshold,
            max_clusters: params.max_clusters,
            next_id: 1,
            clusters: Vec::new(),
        }
    }

    /// Admit a line, returning the id of the cluster it landed in.
    pub fn add(&mut self, line: &str, timestamp: Option<DateTime<Utc>>) -> u64 {
        let mut best: Option<(usize, TemplateUpdate)> = None;
        for (idx, cluster) in self.clusters.iter().enumerate() {
            let update = merge_with_template(&cluster.template, line);
            let better = match &best {
                Some((_, current)) => update.similarity > current.similarity,
                None => true,
            };
            if better {
                best = Some((idx, update));
            }
        }

        if let Some((idx, update)) = best {
            if update.similarity >= self.threshold {
                let cluster = &mut self.clusters[idx];
                cluster.template = update.template;
                cluster.count += 1;
                if cluster.examples.len() < MAX_EXAMPLES {
                    cluster.examples.push(line.to_string());
                }
                if let Some(ts) = timestamp {
                    cluster.timestamps.push(ts);
                }
                return cluster.id;
            }
        }

        if self.clusters.len() >= self.max_clusters {
            self.evict();
        }
        let id = self.next_id;
        self.next_id += 1;
        self.clusters.push(Cluster::open(id, line, timestamp));
        id
    }

    /// Drop the cluster with the smallest count, oldest first on ties.
    fn evict(&mut self) {
        let victim = self
            .clusters
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.count)
            .map(|(idx, _)| idx);
        if let Some(idx) = victim {
            let evicted = self.clusters.remove(idx);
            tracing::debug!(id = evicted.id, count = evicted.count, "evicted cluster");
        }
    }

    pub fn get(&self, id: u64) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// Report rows sorted by count descending.
    pub fn stats(&self) -> Vec<ClusterView> {
        let total: usize = self.clusters.iter().map(|c| c.count).sum();
        let mut views: Vec<ClusterView> = self
            .clusters
            .iter()
            .map(|c| ClusterView {
                id: c.id,
                count: c.count,
                percent: if total == 0 {
                    0.0
                } else {
                    (c.count as f64 * 1000.0 / total as f64).round() / 10.0
                },
                template: c.template.pattern.clone(),
                examples: c.examples.clone(),
            })
            .collect();
        views.sort_by(|a, b| b.count.cmp(&a.count));
        views
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Lines admitted so far, excluding any the caller filtered out.
    pub fn total_count(&self) -> usize {
        self.clusters.iter().map(|c| c.count).sum()
    }
}
