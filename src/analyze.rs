//! Whole-project analysis.
//!
//! Walks a project tree, runs the heuristic inspector over a bounded number
//! of source files, and reports which files have concrete improvement
//! suggestions. Read-only: nothing is patched here.

use std::path::Path;

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::info;
use walkdir::WalkDir;

use crate::suggest::{HeuristicProvider, SuggestionProvider};

/// Source files considered for analysis.
const INCLUDE_GLOBS: &[&str] = &["**/*.py", "**/*.rs", "**/*.js"];
const EXCLUDE_GLOBS: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/__pycache__/**",
    "**/venv/**",
];

#[derive(Debug, Serialize)]
pub struct FileSuggestions {
    pub file: String,
    pub improvements: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectAnalysis {
    pub project_path: String,
    pub source_files: usize,
    pub suggestions: Vec<FileSuggestions>,
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Analyze up to `limit` source files under `project_path`.
pub async fn analyze_project(project_path: &Path, limit: usize) -> Result<ProjectAnalysis> {
    if !project_path.exists() {
        bail!("project not found: {}", project_path.display());
    }

    let include = build_globset(INCLUDE_GLOBS)?;
    let exclude = build_globset(EXCLUDE_GLOBS)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(project_path) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(project_path).unwrap_or(entry.path());
        if exclude.is_match(relative) || !include.is_match(relative) {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }
    files.sort();

    let provider = HeuristicProvider;
    let mut suggestions = Vec::new();

    for file in files.iter().take(limit) {
        let content = std::fs::read_to_string(file).unwrap_or_default();
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Ok(crate::models::PatchSuggestion::Heuristic { improvements, .. }) =
            provider.suggest(&name, &content, "").await
        {
            if !improvements.is_empty() {
                suggestions.push(FileSuggestions {
                    file: file.display().to_string(),
                    improvements,
                });
            }
        }
    }

    info!(
        files = files.len(),
        flagged = suggestions.len(),
        "project analysis complete"
    );

    Ok(ProjectAnalysis {
        project_path: project_path.display().to_string(),
        source_files: files.len(),
        suggestions,
    })
}
