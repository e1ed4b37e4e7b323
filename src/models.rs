//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, index entries, suggestions, and
//! records that flow through an improvement cycle.

use serde::{Deserialize, Serialize};

/// A document in the retrieval corpus.
///
/// Immutable once stored. The `id` is derived from the document's content
/// (see [`crate::store::document_id`]), so identical content always maps to
/// the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub text: String,
    pub source: String,
}

/// Lightweight document metadata carried through the retrieval index.
#[derive(Debug, Clone, Serialize)]
pub struct DocMeta {
    pub title: String,
    pub source: String,
    /// First 200 characters of the document text.
    pub preview: String,
}

/// A single entry in the similarity index.
///
/// Derived deterministically from a [`Document`]; the index is a cache and
/// is rebuilt on demand from the corpus, never persisted.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub meta: DocMeta,
}

/// Ordered retrieval results: `(metadata, score)` pairs, best first.
pub type Retrieved = Vec<(DocMeta, f32)>;

/// A suggested replacement for a file, tagged by the strategy that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PatchSuggestion {
    /// Produced by the static heuristic inspector.
    Heuristic {
        confidence: f64,
        suggestion: String,
        improvements: Vec<String>,
    },
    /// Produced by a remote generation service.
    External {
        confidence: f64,
        suggestion: String,
        model: String,
    },
    /// The suggestion could not be produced at all (e.g. target file missing).
    Error { reason: String },
}

impl PatchSuggestion {
    /// Confidence in `[0, 1]`; error results are always `0.0`.
    pub fn confidence(&self) -> f64 {
        match self {
            PatchSuggestion::Heuristic { confidence, .. } => *confidence,
            PatchSuggestion::External { confidence, .. } => *confidence,
            PatchSuggestion::Error { .. } => 0.0,
        }
    }

    /// Stable method tag used in patch records.
    pub fn method(&self) -> &'static str {
        match self {
            PatchSuggestion::Heuristic { .. } => "heuristic",
            PatchSuggestion::External { .. } => "external",
            PatchSuggestion::Error { .. } => "error",
        }
    }

    /// The suggested file content, empty for error results.
    pub fn suggestion(&self) -> &str {
        match self {
            PatchSuggestion::Heuristic { suggestion, .. } => suggestion,
            PatchSuggestion::External { suggestion, .. } => suggestion,
            PatchSuggestion::Error { .. } => "",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PatchSuggestion::Error { .. })
    }
}

/// Append-only record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// RFC3339 UTC timestamp.
    pub timestamp: String,
    pub success: bool,
    pub duration_secs: f64,
    pub details: serde_json::Value,
}

/// Append-only record of one patch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRecord {
    /// RFC3339 UTC timestamp.
    pub timestamp: String,
    pub file: String,
    pub method: String,
    pub confidence: f64,
    pub applied: bool,
    /// Commit hash recorded after a successful apply.
    pub commit: Option<String>,
}

/// Where a cycle ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No target file was given; retrieval analysis only.
    ReportOnly,
    /// The target file does not exist.
    TargetMissing,
    /// The sandbox verification failed; nothing was mutated.
    ValidationFailed,
    /// Confidence below threshold without auto-apply, or no usable
    /// suggestion was produced.
    Skipped,
    /// The patch was written and committed.
    Applied,
    /// The write failed; the tree was rolled back to the checkpoint.
    ApplyFailed,
}

/// Full report for one improvement cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub query: String,
    pub answer: String,
    pub retrieved_count: usize,
    pub outcome: CycleOutcome,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub duration_secs: f64,
}
