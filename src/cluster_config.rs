use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CLUSTERS: usize = 10;
pub const DEFAULT_THRESHOLD: f64 = 0.4;
pub const MAX_CLUSTERS_MIN: usize = 2;
pub const MAX_CLUSTERS_MAX: usize = 20;
pub const THRESHOLD_MIN: f64 = 0.1;
pub const THRESHOLD_MAX: f64 = 0.9;

/// Threshold used by sub-clusterers during drill-down.
pub const DRILL_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_SUBCLUSTERS: usize = 5;

/// Clustering knobs. Out-of-range values are clamped, never rejected;
/// the clamp is observable only in subsequent results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub max_clusters: usize,
    pub threshold: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            max_clusters: DEFAULT_MAX_CLUSTERS,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ClusterParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters for a drill-down sub-clusterer.
    pub fn drill_down(max_subclusters: usize) -> Self {
        Self::new()
            .with_max_clusters(max_subclusters)
            .with_threshold(DRILL_THRESHOLD)
    }

    pub fn with_max_clusters(mut self, n: usize) -> Self {
        self.max_clusters = n.clamp(MAX_CLUSTERS_MIN, MAX_CLUSTERS_MAX);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(THRESHOLD_MIN, THRESHOLD_MAX);
        self
    }
}
