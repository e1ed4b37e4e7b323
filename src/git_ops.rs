//! Version-control checkpointing.
//!
//! Shells out to the `git` binary for repository initialization, snapshot
//! commits, and rollback. Every operation is idempotent; the checkpoint
//! taken before a patch is applied is the sole recovery anchor.
//!
//! State machine per improvement target:
//!
//! ```text
//! CLEAN → CHECKPOINTED → (APPLIED → COMMITTED)
//!                      | (APPLY_FAILED → ROLLED_BACK)
//! ```

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Run a git subcommand in `cwd`, returning success and combined output.
fn run_git(args: &[&str], cwd: &Path) -> Result<(bool, String)> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args.join(" ")))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        combined.push_str("\nERROR:\n");
        combined.push_str(&stderr);
    }

    Ok((output.status.success(), combined))
}

/// Initialize a repository at `path` if one is not already present.
///
/// A fresh init also sets a repo-local identity so commits succeed on hosts
/// without a global git config. Safe to call repeatedly.
pub fn init_repo(path: &Path) -> Result<bool> {
    if path.join(".git").exists() {
        return Ok(true);
    }

    info!(path = %path.display(), "initializing git repository");
    let (ok, output) = run_git(&["init"], path)?;
    if !ok {
        warn!(output = %output.trim(), "git init failed");
        return Ok(false);
    }

    run_git(&["config", "user.name", "auto-engineer"], path)?;
    run_git(&["config", "user.email", "auto-engineer@local"], path)?;
    Ok(true)
}

/// Stage and commit all changes.
///
/// "Nothing to commit" is success, not failure: the working tree already
/// matches the would-be snapshot.
pub fn commit_all(path: &Path, message: &str) -> Result<(bool, String)> {
    run_git(&["add", "-A"], path)?;

    let (ok, output) = run_git(&["commit", "-m", message], path)?;
    if !ok {
        if output.to_lowercase().contains("nothing to commit") {
            return Ok((true, "nothing to commit".to_string()));
        }
        warn!(output = %output.trim(), "git commit failed");
        return Ok((false, output));
    }

    info!(message = %message, "commit created");
    Ok((true, output))
}

/// Current HEAD commit hash, or `None` before the first commit.
pub fn current_commit(path: &Path) -> Result<Option<String>> {
    let (ok, output) = run_git(&["rev-parse", "HEAD"], path)?;
    if !ok {
        return Ok(None);
    }
    Ok(Some(
        output.lines().next().unwrap_or_default().trim().to_string(),
    ))
}

/// Hard-reset the working tree to `commit`.
///
/// Destructive: discards all uncommitted changes to tracked files. Used only
/// when a patch apply fails after checkpointing.
pub fn rollback(path: &Path, commit: &str) -> Result<(bool, String)> {
    warn!(commit = %commit, "rolling back working tree");
    let (ok, output) = run_git(&["reset", "--hard", commit], path)?;
    if ok {
        info!(commit = %commit, "rollback complete");
    } else {
        warn!(output = %output.trim(), "rollback failed");
    }
    Ok((ok, output))
}

/// Diff of uncommitted changes, optionally limited to one file.
pub fn diff(path: &Path, file: Option<&str>) -> Result<String> {
    let mut args = vec!["diff"];
    if let Some(f) = file {
        args.push(f);
    }
    let (ok, output) = run_git(&args, path)?;
    Ok(if ok { output } else { String::new() })
}

/// One-line log of the most recent `n` commits.
pub fn log(path: &Path, n: usize) -> Result<String> {
    let count = n.to_string();
    let (ok, output) = run_git(&["log", "--oneline", "-n", &count], path)?;
    Ok(if ok {
        output
    } else {
        "no commits found".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_with_file() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("test.txt"), "first\n").unwrap();
        dir
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = repo_with_file();
        assert!(init_repo(dir.path()).unwrap());
        assert!(init_repo(dir.path()).unwrap());
        assert!(dir.path().join(".git").exists());
    }

    #[test]
    fn test_no_commit_yields_sentinel() {
        let dir = repo_with_file();
        init_repo(dir.path()).unwrap();
        assert_eq!(current_commit(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_commit_and_nothing_to_commit() {
        let dir = repo_with_file();
        init_repo(dir.path()).unwrap();

        let (ok, _) = commit_all(dir.path(), "initial").unwrap();
        assert!(ok);
        assert!(current_commit(dir.path()).unwrap().is_some());

        // Second commit with a clean tree is still success.
        let (ok, output) = commit_all(dir.path(), "noop").unwrap();
        assert!(ok);
        assert_eq!(output, "nothing to commit");
    }

    #[test]
    fn test_rollback_restores_bytes() {
        let dir = repo_with_file();
        let file = dir.path().join("test.txt");

        init_repo(dir.path()).unwrap();
        commit_all(dir.path(), "checkpoint").unwrap();
        let checkpoint = current_commit(dir.path()).unwrap().unwrap();

        std::fs::write(&file, "mutated\n").unwrap();
        commit_all(dir.path(), "mutation").unwrap();
        assert_ne!(std::fs::read_to_string(&file).unwrap(), "first\n");

        let (ok, _) = rollback(dir.path(), &checkpoint).unwrap();
        assert!(ok);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "first\n");
        assert_eq!(current_commit(dir.path()).unwrap().unwrap(), checkpoint);
    }

    #[test]
    fn test_diff_and_log() {
        let dir = repo_with_file();
        init_repo(dir.path()).unwrap();
        commit_all(dir.path(), "initial").unwrap();

        std::fs::write(dir.path().join("test.txt"), "changed\n").unwrap();
        let d = diff(dir.path(), None).unwrap();
        assert!(d.contains("changed"));

        let l = log(dir.path(), 5).unwrap();
        assert!(l.contains("initial"));
    }
}
