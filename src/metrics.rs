//! Pipeline metrics collection.
//!
//! An append-only record of runs and patch attempts with aggregate counters
//! recomputed from the complete history on every write. Like the document
//! corpus, the store hides behind a narrow trait so tests can swap the
//! filesystem for memory.

use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::models::{PatchRecord, RunRecord};

/// The full metrics document.
///
/// Created with exactly these four top-level members on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub runs: Vec<RunRecord>,
    pub patches: Vec<PatchRecord>,
    pub projects: BTreeMap<String, ProjectMetrics>,
    pub system: SystemMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetrics {
    pub created_at: String,
    pub metrics: BTreeMap<String, ProjectMetricValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetricValue {
    pub value: Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub created_at: String,
    pub total_runs: u64,
    pub total_patches: u64,
    pub success_rate: f64,
}

/// RFC3339 UTC timestamp with a trailing `Z`.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Metrics {
    fn empty() -> Self {
        Self {
            runs: Vec::new(),
            patches: Vec::new(),
            projects: BTreeMap::new(),
            system: SystemMetrics {
                created_at: now_ts(),
                total_runs: 0,
                total_patches: 0,
                success_rate: 0.0,
            },
        }
    }
}

/// Abstract metrics backend.
pub trait MetricsStore: Send + Sync {
    /// Load the metrics document, creating an empty one on first use.
    fn load(&self) -> Result<Metrics>;

    fn save(&self, metrics: &Metrics) -> Result<()>;
}

/// JSON-file-backed metrics store.
pub struct JsonMetricsStore {
    path: PathBuf,
}

impl JsonMetricsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsStore for JsonMetricsStore {
    fn load(&self) -> Result<Metrics> {
        if !self.path.exists() {
            let metrics = Metrics::empty();
            self.save(&metrics)?;
            return Ok(metrics);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, metrics: &Metrics) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(metrics)?)?;
        Ok(())
    }
}

/// In-memory metrics store for tests.
pub struct MemoryMetricsStore {
    metrics: RwLock<Metrics>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(Metrics::empty()),
        }
    }
}

impl Default for MemoryMetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore for MemoryMetricsStore {
    fn load(&self) -> Result<Metrics> {
        Ok(self.metrics.read().unwrap().clone())
    }

    fn save(&self, metrics: &Metrics) -> Result<()> {
        *self.metrics.write().unwrap() = metrics.clone();
        Ok(())
    }
}

/// Append a run record and recompute the aggregates over the full history.
pub fn record_run(store: &dyn MetricsStore, record: RunRecord) -> Result<()> {
    let mut metrics = store.load()?;

    metrics.runs.push(record);
    metrics.system.total_runs = metrics.runs.len() as u64;

    let successful = metrics.runs.iter().filter(|r| r.success).count();
    metrics.system.success_rate = successful as f64 / metrics.runs.len() as f64;

    store.save(&metrics)?;
    info!(
        total_runs = metrics.system.total_runs,
        success_rate = metrics.system.success_rate,
        "run recorded"
    );
    Ok(())
}

/// Append a patch record and recompute the patch counter.
pub fn record_patch(store: &dyn MetricsStore, record: PatchRecord) -> Result<()> {
    let mut metrics = store.load()?;

    metrics.patches.push(record);
    metrics.system.total_patches = metrics.patches.len() as u64;

    store.save(&metrics)?;
    info!(total_patches = metrics.system.total_patches, "patch recorded");
    Ok(())
}

/// Record a named metric for one project.
pub fn record_project_metric(
    store: &dyn MetricsStore,
    project: &str,
    name: &str,
    value: Value,
) -> Result<()> {
    let mut metrics = store.load()?;

    let entry = metrics
        .projects
        .entry(project.to_string())
        .or_insert_with(|| ProjectMetrics {
            created_at: now_ts(),
            metrics: BTreeMap::new(),
        });
    entry.metrics.insert(
        name.to_string(),
        ProjectMetricValue {
            value,
            timestamp: now_ts(),
        },
    );

    store.save(&metrics)?;
    Ok(())
}

/// Condensed view of the metrics document.
#[derive(Debug, Serialize)]
pub struct MetricsSummary {
    pub system: SystemMetrics,
    pub total_projects: usize,
    pub last_run: Option<RunRecord>,
    pub last_patch: Option<PatchRecord>,
}

pub fn summary(store: &dyn MetricsStore) -> Result<MetricsSummary> {
    let metrics = store.load()?;
    Ok(MetricsSummary {
        total_projects: metrics.projects.len(),
        last_run: metrics.runs.last().cloned(),
        last_patch: metrics.patches.last().cloned(),
        system: metrics.system,
    })
}
