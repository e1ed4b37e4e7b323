use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    /// Working tree that improvement cycles target.
    #[serde(default = "default_project_root")]
    pub root: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_project_root(),
        }
    }
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoresConfig {
    #[serde(default = "default_docs_path")]
    pub docs_path: PathBuf,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: PathBuf,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            docs_path: default_docs_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

fn default_docs_path() -> PathBuf {
    PathBuf::from("data/docs_store.json")
}
fn default_metrics_path() -> PathBuf {
    PathBuf::from("data/metrics.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Embedding dimensionality.
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Number of results returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dim: default_dim(),
            top_k: default_top_k(),
        }
    }
}

fn default_dim() -> usize {
    16
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuggestConfig {
    /// Suggestion strategy: `heuristic` or `remote` (falls back to heuristic).
    #[serde(default = "default_suggest_provider")]
    pub provider: String,
    /// Endpoint for the remote suggestion service.
    #[serde(default)]
    pub endpoint: String,
    /// Advisory model name sent to the remote service.
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_suggest_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_suggest_retries")]
    pub max_retries: u32,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            provider: default_suggest_provider(),
            endpoint: String::new(),
            model: String::new(),
            timeout_secs: default_suggest_timeout(),
            max_retries: default_suggest_retries(),
        }
    }
}

fn default_suggest_provider() -> String {
    "heuristic".to_string()
}
fn default_suggest_timeout() -> u64 {
    20
}
fn default_suggest_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Wall-clock limit for the sandboxed subprocess, in seconds.
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,
    /// Verification command run against the unmodified project tree before
    /// any mutation. Empty vector skips validation.
    #[serde(default)]
    pub verify_command: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_sandbox_timeout(),
            verify_command: Vec::new(),
        }
    }
}

fn default_sandbox_timeout() -> u64 {
    30
}

impl SuggestConfig {
    pub fn remote_enabled(&self) -> bool {
        self.provider == "remote"
    }
}

impl Config {
    /// All-defaults configuration for commands that tolerate a missing file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if config.retrieval.dim == 0 {
        anyhow::bail!("retrieval.dim must be > 0");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate sandbox
    if config.sandbox.timeout_secs == 0 {
        anyhow::bail!("sandbox.timeout_secs must be > 0");
    }

    // Validate suggestion strategy
    match config.suggest.provider.as_str() {
        "heuristic" => {}
        "remote" => {
            if config.suggest.endpoint.is_empty() {
                anyhow::bail!("suggest.endpoint must be set when provider is 'remote'");
            }
        }
        other => anyhow::bail!(
            "Unknown suggestion provider: '{}'. Must be heuristic or remote.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_defaults() {
        let f = write_config("");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.retrieval.dim, 16);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.sandbox.timeout_secs, 30);
        assert_eq!(cfg.suggest.provider, "heuristic");
    }

    #[test]
    fn test_rejects_zero_dim() {
        let f = write_config("[retrieval]\ndim = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_remote_requires_endpoint() {
        let f = write_config("[suggest]\nprovider = \"remote\"\n");
        assert!(load_config(f.path()).is_err());

        let f = write_config(
            "[suggest]\nprovider = \"remote\"\nendpoint = \"http://localhost:9000/suggest\"\n",
        );
        assert!(load_config(f.path()).is_ok());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let f = write_config("[suggest]\nprovider = \"oracle\"\n");
        assert!(load_config(f.path()).is_err());
    }
}
