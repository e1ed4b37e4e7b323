//! Patch suggestion engine.
//!
//! Suggestions come from an ordered chain of [`SuggestionProvider`]
//! strategies: a remote generation service (when configured) followed by the
//! static heuristic inspector. A provider failure is non-fatal; it is
//! logged and the chain falls through to the next strategy. The heuristic
//! provider never fails, so the chain always yields a result.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::SuggestConfig;
use crate::models::PatchSuggestion;

/// Confidence assigned to remote suggestions.
const EXTERNAL_CONFIDENCE: f64 = 0.75;
/// Confidence when the heuristic finds concrete improvements.
const HEURISTIC_CONFIDENCE: f64 = 0.6;
/// Confidence when the heuristic finds nothing to improve.
const NO_CHANGES_CONFIDENCE: f64 = 0.3;

/// Maximum file content sent to the remote service.
const REMOTE_CONTENT_LIMIT: usize = 2000;

/// A single suggestion strategy.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a suggestion for `content`. Returning `Err` (or an error
    /// variant) hands over to the next provider in the chain.
    async fn suggest(
        &self,
        file_name: &str,
        content: &str,
        context: &str,
    ) -> Result<PatchSuggestion>;
}

// ============ Heuristic Provider ============

/// Static inspector that flags common quality gaps in source text.
pub struct HeuristicProvider;

impl HeuristicProvider {
    fn improvements(content: &str) -> Vec<String> {
        let mut found = Vec::new();
        let has_functions = content.contains("def ") || content.contains("fn ");

        if has_functions
            && !content.contains("\"\"\"")
            && !content.contains("'''")
            && !content.contains("///")
        {
            found.push("Add docstrings to functions".to_string());
        }
        if has_functions && !content.contains("->") {
            found.push("Add type hints".to_string());
        }
        if !content.contains("try:") && (content.contains("open(") || content.contains("json.load"))
        {
            found.push("Add exception handling around I/O".to_string());
        }
        if has_functions && !content.contains("import logging") {
            found.push("Add logging".to_string());
        }
        found
    }
}

#[async_trait]
impl SuggestionProvider for HeuristicProvider {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn suggest(
        &self,
        _file_name: &str,
        content: &str,
        _context: &str,
    ) -> Result<PatchSuggestion> {
        let improvements = Self::improvements(content);

        if improvements.is_empty() {
            return Ok(PatchSuggestion::Heuristic {
                confidence: NO_CHANGES_CONFIDENCE,
                suggestion: format!("{}\n# Code looks well structured\n", content),
                improvements,
            });
        }

        let mut suggestion = format!("{}\n\n# Suggested improvements:\n", content);
        for (i, imp) in improvements.iter().enumerate() {
            suggestion.push_str(&format!("# {}. {}\n", i + 1, imp));
        }

        Ok(PatchSuggestion::Heuristic {
            confidence: HEURISTIC_CONFIDENCE,
            suggestion,
            improvements,
        })
    }
}

// ============ Remote Provider ============

/// Suggestion strategy backed by a remote generation service.
///
/// POSTs the file content to the configured endpoint and expects a JSON
/// body with a `suggestion` string. Authentication comes from the
/// `SUGGEST_API_TOKEN` environment variable. Transient errors (429, 5xx,
/// network) retry with exponential backoff; other client errors fail
/// immediately. Every failure mode is non-fatal to the pipeline.
pub struct RemoteProvider {
    endpoint: String,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl RemoteProvider {
    pub fn new(config: &SuggestConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            bail!("suggest.endpoint required for remote provider");
        }
        if std::env::var("SUGGEST_API_TOKEN").is_err() {
            bail!("SUGGEST_API_TOKEN environment variable not set");
        }
        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl SuggestionProvider for RemoteProvider {
    fn name(&self) -> &str {
        "remote"
    }

    async fn suggest(
        &self,
        file_name: &str,
        content: &str,
        context: &str,
    ) -> Result<PatchSuggestion> {
        let token = std::env::var("SUGGEST_API_TOKEN")
            .map_err(|_| anyhow::anyhow!("SUGGEST_API_TOKEN not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let truncated: String = content.chars().take(REMOTE_CONTENT_LIMIT).collect();
        let body = serde_json::json!({
            "model": self.model,
            "file": file_name,
            "content": truncated,
            "context": context,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", token))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let suggestion = json
                            .get("suggestion")
                            .and_then(|s| s.as_str())
                            .ok_or_else(|| {
                                anyhow::anyhow!("Malformed response: missing 'suggestion'")
                            })?;
                        return Ok(PatchSuggestion::External {
                            confidence: EXTERNAL_CONFIDENCE,
                            suggestion: suggestion.to_string(),
                            model: self.model.clone(),
                        });
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "suggestion service error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error other than 429, no retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("suggestion service error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("suggestion failed after retries")))
    }
}

/// Build the ordered provider chain from configuration.
///
/// The remote provider goes first when configured and credentialed; the
/// heuristic provider is always last, so the chain cannot come up empty.
pub fn build_providers(config: &SuggestConfig) -> Vec<Box<dyn SuggestionProvider>> {
    let mut providers: Vec<Box<dyn SuggestionProvider>> = Vec::new();

    if config.remote_enabled() {
        match RemoteProvider::new(config) {
            Ok(p) => providers.push(Box::new(p)),
            Err(e) => warn!(error = %e, "remote provider unavailable, using heuristic only"),
        }
    }

    providers.push(Box::new(HeuristicProvider));
    providers
}

/// Produce a suggestion for `file_path` by trying each provider in order.
///
/// A missing target file short-circuits to an error result with zero
/// confidence; the cycle continues in report-only mode.
pub async fn suggest_patch(
    providers: &[Box<dyn SuggestionProvider>],
    file_path: &Path,
    context: &str,
) -> PatchSuggestion {
    if !file_path.exists() {
        error!(file = %file_path.display(), "target file not found");
        return PatchSuggestion::Error {
            reason: "file not found".to_string(),
        };
    }

    let content = match std::fs::read_to_string(file_path) {
        Ok(c) => c,
        Err(e) => {
            error!(file = %file_path.display(), error = %e, "failed to read target file");
            return PatchSuggestion::Error {
                reason: e.to_string(),
            };
        }
    };

    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    for provider in providers {
        match provider.suggest(&file_name, &content, context).await {
            Ok(suggestion) if !suggestion.is_error() => {
                info!(
                    provider = provider.name(),
                    confidence = suggestion.confidence(),
                    "suggestion produced"
                );
                return suggestion;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "provider failed, falling through");
            }
        }
    }

    PatchSuggestion::Error {
        reason: "all suggestion providers failed".to_string(),
    }
}

/// Overwrite `file_path` with `content`, optionally keeping a backup of the
/// original.
///
/// Returns `false` on any I/O failure; the backup, if written, is left in
/// place so the original content is recoverable.
pub fn apply_patch(file_path: &Path, content: &str, backup: bool) -> bool {
    if backup && file_path.exists() {
        let backup_path = file_path.with_extension(
            file_path
                .extension()
                .map(|e| format!("{}.backup", e.to_string_lossy()))
                .unwrap_or_else(|| "backup".to_string()),
        );
        match std::fs::read_to_string(file_path)
            .and_then(|original| std::fs::write(&backup_path, original))
        {
            Ok(()) => info!(backup = %backup_path.display(), "backup written"),
            Err(e) => {
                error!(error = %e, "failed to write backup, not applying patch");
                return false;
            }
        }
    }

    match std::fs::write(file_path, content) {
        Ok(()) => {
            info!(file = %file_path.display(), "patch applied");
            true
        }
        Err(e) => {
            error!(file = %file_path.display(), error = %e, "failed to apply patch");
            false
        }
    }
}
