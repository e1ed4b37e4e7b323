//! Sandboxed command execution.
//!
//! Runs an arbitrary command against a disposable copy of a project tree,
//! bounded by a wall-clock timeout. The copy lives in a [`tempfile::TempDir`]
//! whose drop guarantees cleanup on every exit path, including timeout.
//! On expiry the child process is force-killed.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::process::Command;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Result of a sandboxed run.
///
/// `success` is exactly "the process exited with code 0 within the timeout".
/// A timeout is reported as failure with `timed_out` set, distinct from a
/// non-zero exit.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    pub success: bool,
    pub output: String,
    pub timed_out: bool,
}

fn default_excludes() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in [
        "**/.git/**",
        "**/target/**",
        "**/node_modules/**",
        "**/__pycache__/**",
        "**/venv/**",
    ] {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Recursively copy `src` into `dest`, skipping the default excludes.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let excludes = default_excludes()?;

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(src).unwrap_or(path);
        if relative.as_os_str().is_empty() {
            continue;
        }
        if excludes.is_match(relative) {
            continue;
        }

        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(path, &target)
                .with_context(|| format!("Failed to copy {} into sandbox", path.display()))?;
        }
    }
    Ok(())
}

/// Run `cmd` against an isolated copy of `source_dir`.
///
/// Stdout and stderr are captured and combined. Spawn failures (missing
/// binary, empty command) are stage-local: they produce a failed outcome,
/// not an error.
pub async fn run_in_sandbox(
    source_dir: &Path,
    cmd: &[String],
    timeout: Duration,
) -> Result<SandboxOutcome> {
    let tmp = tempfile::Builder::new()
        .prefix("sandbox_")
        .tempdir()
        .context("Failed to create sandbox directory")?;
    let sandbox_root = tmp.path().join("project");

    info!(source = %source_dir.display(), "copying project into sandbox");
    copy_tree(source_dir, &sandbox_root)?;

    let Some((program, args)) = cmd.split_first() else {
        return Ok(SandboxOutcome {
            success: false,
            output: "empty sandbox command".to_string(),
            timed_out: false,
        });
    };

    info!(command = %cmd.join(" "), "running sandboxed command");
    let child = Command::new(program)
        .args(args)
        .current_dir(&sandbox_root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(c) => c,
        Err(e) => {
            return Ok(SandboxOutcome {
                success: false,
                output: format!("failed to spawn '{}': {}", program, e),
                timed_out: false,
            });
        }
    };

    let outcome = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => {
            let output = result.context("Failed to collect sandboxed command output")?;
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                combined.push_str("\nSTDERR:\n");
                combined.push_str(&stderr);
            }
            SandboxOutcome {
                success: output.status.success(),
                output: combined,
                timed_out: false,
            }
        }
        Err(_) => {
            // wait_with_output consumed the child; kill_on_drop already
            // terminated it when the future was dropped by the timeout.
            SandboxOutcome {
                success: false,
                output: format!("timed out after {}s", timeout.as_secs()),
                timed_out: true,
            }
        }
    };

    info!(success = outcome.success, timed_out = outcome.timed_out, "sandbox run finished");

    // TempDir drop removes the tree; an explicit close surfaces cleanup
    // problems here so they can be logged instead of silently ignored.
    if let Err(e) = tmp.close() {
        warn!(error = %e, "failed to clean up sandbox directory");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_file() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_exit_zero_is_success() {
        let project = project_with_file();
        let outcome = run_in_sandbox(
            project.path(),
            &["cat".to_string(), "hello.txt".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(outcome.success);
        assert!(!outcome.timed_out);
        assert!(outcome.output.contains("hello"));
    }

    #[tokio::test]
    async fn test_false_command_fails() {
        let project = project_with_file();
        let outcome = run_in_sandbox(project.path(), &["false".to_string()], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_failure() {
        let project = project_with_file();
        let outcome = run_in_sandbox(
            project.path(),
            &["sleep".to_string(), "30".to_string()],
            Duration::from_millis(200),
        )
        .await
        .unwrap();

        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert!(outcome.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_stage_local_failure() {
        let project = project_with_file();
        let outcome = run_in_sandbox(
            project.path(),
            &["definitely-not-a-real-binary".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(!outcome.success);
        assert!(outcome.output.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_command_runs_against_a_copy() {
        let project = project_with_file();
        // Delete the file inside the sandbox; the original must survive.
        let outcome = run_in_sandbox(
            project.path(),
            &["rm".to_string(), "hello.txt".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(outcome.success);
        assert!(project.path().join("hello.txt").exists());
    }

    #[tokio::test]
    async fn test_sandbox_directory_is_cleaned_up_after_failure() {
        let project = project_with_file();

        // The command reports its own cwd, then fails.
        let outcome = run_in_sandbox(
            project.path(),
            &["sh".to_string(), "-c".to_string(), "pwd; exit 1".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(!outcome.success);
        let sandbox_path = outcome.output.lines().next().unwrap().trim().to_string();
        assert!(!sandbox_path.is_empty());
        assert!(!Path::new(&sandbox_path).exists(), "sandbox directory leaked");
    }

    #[tokio::test]
    async fn test_sandbox_directory_is_cleaned_up_after_timeout() {
        let project = project_with_file();
        let markers = tempfile::TempDir::new().unwrap();
        let marker = markers.path().join("cwd.txt");

        // The command records its cwd to a marker outside the sandbox, then
        // hangs past the deadline.
        let script = format!("pwd > {}; sleep 30", marker.display());
        let outcome = run_in_sandbox(
            project.path(),
            &["sh".to_string(), "-c".to_string(), script],
            Duration::from_millis(300),
        )
        .await
        .unwrap();

        assert!(outcome.timed_out);
        let sandbox_path = std::fs::read_to_string(&marker).unwrap().trim().to_string();
        assert!(!Path::new(&sandbox_path).exists(), "sandbox directory leaked");
    }
}
