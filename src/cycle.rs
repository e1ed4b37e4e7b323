//! Improvement-cycle orchestration.
//!
//! Sequences the pipeline stages for one end-to-end cycle:
//!
//! ```text
//! ANALYZE → SUGGEST → VALIDATE → {DECIDE → APPLY → COMMIT} | SKIP → RECORD
//! ```
//!
//! Stage-local failures (sandbox, providers, git) become structured results;
//! only corpus corruption is fatal. The RECORD stage always runs, so every
//! cycle leaves exactly one run record behind.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::git_ops;
use crate::index::{build_index, retrieve, synthesize_answer};
use crate::metrics::{now_ts, record_patch, record_run, MetricsStore};
use crate::models::{CycleOutcome, CycleReport, PatchRecord, RunRecord};
use crate::sandbox::run_in_sandbox;
use crate::store::DocumentStore;
use crate::suggest::{apply_patch, suggest_patch, SuggestionProvider};

/// Suggestions above this confidence are applied without `--auto-apply`.
pub const APPLY_THRESHOLD: f64 = 0.7;

/// Inputs for one cycle.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub query: String,
    /// Target file, relative to the configured project root.
    pub target_file: Option<String>,
    pub auto_apply: bool,
}

/// Run one improvement cycle.
///
/// Returns an error only for process-fatal conditions (corrupt corpus,
/// unusable metrics store); everything else lands in the report.
pub async fn run_cycle(
    cfg: &Config,
    docs: &dyn DocumentStore,
    metrics: &dyn MetricsStore,
    providers: &[Box<dyn SuggestionProvider>],
    opts: &CycleOptions,
) -> Result<CycleReport> {
    let start = Instant::now();
    info!(query = %opts.query, target = ?opts.target_file, "starting improvement cycle");

    // ANALYZE: retrieval over the corpus. Corruption is fatal by contract.
    let corpus = docs.load().context("corpus unavailable")?;
    let index = build_index(&corpus, cfg.retrieval.dim);
    let retrieved = retrieve(&opts.query, &index, cfg.retrieval.top_k);
    let answer = synthesize_answer(&opts.query, &retrieved);

    let mut details = json!({
        "query": opts.query,
        "retrieved_count": retrieved.len(),
    });

    let mut report = CycleReport {
        query: opts.query.clone(),
        answer,
        retrieved_count: retrieved.len(),
        outcome: CycleOutcome::ReportOnly,
        success: true,
        target_file: opts.target_file.clone(),
        patch: None,
        sandbox_output: None,
        commit: None,
        duration_secs: 0.0,
    };

    if let Some(target_file) = &opts.target_file {
        run_patch_stages(cfg, providers, target_file, opts.auto_apply, &mut report, &mut details)
            .await?;
    }

    report.duration_secs = start.elapsed().as_secs_f64();

    // RECORD: always executes, whatever happened above.
    details["outcome"] = json!(report.outcome);
    record_run(
        metrics,
        RunRecord {
            timestamp: now_ts(),
            success: report.success,
            duration_secs: report.duration_secs,
            details,
        },
    )?;

    if let Some(patch) = &report.patch {
        record_patch(
            metrics,
            PatchRecord {
                timestamp: now_ts(),
                file: opts.target_file.clone().unwrap_or_default(),
                method: patch.method().to_string(),
                confidence: patch.confidence(),
                applied: report.outcome == CycleOutcome::Applied,
                commit: report.commit.clone(),
            },
        )?;
    }

    info!(
        outcome = ?report.outcome,
        duration_secs = report.duration_secs,
        "cycle finished"
    );
    Ok(report)
}

/// SUGGEST → VALIDATE → DECIDE → APPLY for a named target file.
async fn run_patch_stages(
    cfg: &Config,
    providers: &[Box<dyn SuggestionProvider>],
    target_file: &str,
    auto_apply: bool,
    report: &mut CycleReport,
    details: &mut serde_json::Value,
) -> Result<()> {
    let target_path = cfg.project.root.join(target_file);

    // SUGGEST
    if !target_path.exists() {
        warn!(file = %target_path.display(), "target file not found");
        details["patch_error"] = json!("file not found");
        report.outcome = CycleOutcome::TargetMissing;
        report.success = false;
        return Ok(());
    }

    let context = format!("Query: {}", report.query);
    let suggestion = suggest_patch(providers, &target_path, &context).await;
    info!(
        method = suggestion.method(),
        confidence = suggestion.confidence(),
        "suggestion ready"
    );
    report.patch = Some(suggestion.clone());

    // VALIDATE: run the verification command against the unmodified tree.
    if !cfg.sandbox.verify_command.is_empty() {
        let outcome = run_in_sandbox(
            &cfg.project.root,
            &cfg.sandbox.verify_command,
            Duration::from_secs(cfg.sandbox.timeout_secs),
        )
        .await?;

        if !outcome.success {
            warn!(timed_out = outcome.timed_out, "sandbox validation failed, not applying");
            details["sandbox_output"] = json!(outcome.output);
            report.sandbox_output = Some(outcome.output);
            report.outcome = CycleOutcome::ValidationFailed;
            report.success = false;
            return Ok(());
        }
        report.sandbox_output = Some(outcome.output);
    }

    // DECIDE: an error result carries no content to apply, so not even
    // auto-apply forces it through.
    let should_apply =
        !suggestion.is_error() && (auto_apply || suggestion.confidence() > APPLY_THRESHOLD);
    if !should_apply {
        info!(
            confidence = suggestion.confidence(),
            threshold = APPLY_THRESHOLD,
            "below threshold, skipping apply"
        );
        report.outcome = CycleOutcome::Skipped;
        return Ok(());
    }

    // APPLY: checkpoint first, then mutate, then commit.
    git_ops::init_repo(&cfg.project.root)?;
    git_ops::commit_all(&cfg.project.root, "pre-patch checkpoint")?;
    let checkpoint = git_ops::current_commit(&cfg.project.root)?;

    if apply_patch(&target_path, suggestion.suggestion(), true) {
        let message = format!("auto-patch applied to {}", target_file);
        git_ops::commit_all(&cfg.project.root, &message)?;
        report.commit = git_ops::current_commit(&cfg.project.root)?;
        report.outcome = CycleOutcome::Applied;
    } else {
        // The checkpoint is the recovery anchor: restore the tree rather
        // than leaving a possibly half-written target behind.
        if let Some(cp) = &checkpoint {
            git_ops::rollback(&cfg.project.root, cp)?;
        }
        details["patch_error"] = json!("apply failed, rolled back to checkpoint");
        report.outcome = CycleOutcome::ApplyFailed;
        report.success = false;
    }

    Ok(())
}

/// Run `cycles` sequential improvement cycles, printing each report.
///
/// Returns the final cycle's report so the caller can derive the process
/// exit code from it.
pub async fn run_cycles(
    cfg: &Config,
    docs: &dyn DocumentStore,
    metrics: &dyn MetricsStore,
    providers: &[Box<dyn SuggestionProvider>],
    opts: &CycleOptions,
    cycles: usize,
) -> Result<CycleReport> {
    let mut last = None;

    for i in 0..cycles {
        if cycles > 1 {
            println!("cycle {}/{}", i + 1, cycles);
        }
        let report = run_cycle(cfg, docs, metrics, providers, opts).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        last = Some(report);
    }

    last.ok_or_else(|| anyhow::anyhow!("cycle count must be >= 1"))
}
