//! GB-005: GitLab instance configuration (YAML files plus environment).
//!
//! ```yaml
//! default: mff
//! instances:
//!   mff:
//!     url: https://gitlab.example.org
//!     private_token: glpat-xxxx
//! ```

use super::error::Error;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root of a configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Instance used when `--instance` is not given
    #[serde(default)]
    pub default: Option<String>,

    /// Known instances by name
    #[serde(default)]
    pub instances: IndexMap<String, InstanceConfig>,
}

/// Connection settings for one GitLab instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Base URL, e.g. `https://gitlab.com`
    pub url: String,

    /// Personal/project access token (sent as `PRIVATE-TOKEN`)
    #[serde(default)]
    pub private_token: Option<String>,

    /// OAuth token (sent as bearer)
    #[serde(default)]
    pub oauth_token: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for retryable failures (connection errors, 429, 5xx)
    #[serde(default = "default_retries")]
    pub retries: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> usize {
    6
}

impl InstanceConfig {
    pub fn new(url: &str, private_token: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            private_token,
            oauth_token: None,
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

/// Parse a configuration file from a YAML string.
pub fn parse_config(yaml: &str) -> Result<BatchConfig, Error> {
    serde_yaml_ng::from_str(yaml).map_err(|e| Error::Config(format!("YAML parse error: {}", e)))
}

/// Parse a configuration file from disk.
pub fn parse_config_file(path: &Path) -> Result<BatchConfig, Error> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Files consulted when no `--config-file` is given, in increasing priority.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/gitlab-batch.yaml")];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(Path::new(&home).join(".config").join("gitlab-batch.yaml"));
    }
    if let Ok(explicit) = std::env::var("GITLAB_BATCH_CONFIG") {
        paths.push(PathBuf::from(explicit));
    }
    paths
}

/// Merge several files; later files override instances of the same name.
pub fn load_config(paths: &[PathBuf]) -> Result<BatchConfig, Error> {
    let mut merged = BatchConfig::default();
    for path in paths {
        let config = parse_config_file(path)?;
        if config.default.is_some() {
            merged.default = config.default;
        }
        merged.instances.extend(config.instances);
    }
    Ok(merged)
}

/// Pick the instance to use.
///
/// Explicit `--instance` wins, then the file's `default`, then the only
/// configured instance, then `GITLAB_URL`/`GITLAB_TOKEN` from the environment.
pub fn select_instance(
    config: &BatchConfig,
    requested: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<InstanceConfig, Error> {
    if let Some(name) = requested.or(config.default.as_deref()) {
        return config
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown instance '{}'", name)));
    }
    if config.instances.len() == 1 {
        if let Some(instance) = config.instances.values().next() {
            return Ok(instance.clone());
        }
    }
    if let Some(url) = env("GITLAB_URL") {
        return Ok(InstanceConfig::new(&url, env("GITLAB_TOKEN")));
    }
    if config.instances.is_empty() {
        Err(Error::Config(
            "no GitLab instance configured (use --config-file or GITLAB_URL)".to_string(),
        ))
    } else {
        Err(Error::Config(format!(
            "several instances configured ({}), choose one with --instance",
            config.instances.keys().cloned().collect::<Vec<_>>().join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: &str = r#"
default: mff
instances:
  mff:
    url: https://gitlab.mff.example
    private_token: abc
  lab:
    url: https://lab.example
    oauth_token: xyz
    timeout_secs: 5
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_gb005_parse_defaults() {
        let config = parse_config(TWO).unwrap();
        assert_eq!(config.instances.len(), 2);
        let mff = &config.instances["mff"];
        assert_eq!(mff.timeout_secs, 30);
        assert_eq!(mff.retries, 6);
        assert_eq!(config.instances["lab"].timeout_secs, 5);
    }

    #[test]
    fn test_gb005_select_default_and_explicit() {
        let config = parse_config(TWO).unwrap();
        assert_eq!(select_instance(&config, None, no_env).unwrap().url, "https://gitlab.mff.example");
        assert_eq!(select_instance(&config, Some("lab"), no_env).unwrap().url, "https://lab.example");
        assert!(select_instance(&config, Some("nope"), no_env).is_err());
    }

    #[test]
    fn test_gb005_select_single_instance() {
        let config = parse_config("instances:\n  only:\n    url: https://x\n").unwrap();
        assert_eq!(select_instance(&config, None, no_env).unwrap().url, "https://x");
    }

    #[test]
    fn test_gb005_select_ambiguous() {
        let config = parse_config(
            "instances:\n  a:\n    url: https://a\n  b:\n    url: https://b\n",
        )
        .unwrap();
        let err = select_instance(&config, None, no_env).unwrap_err();
        assert!(err.to_string().contains("--instance"));
    }

    #[test]
    fn test_gb005_select_from_env() {
        let env = |key: &str| match key {
            "GITLAB_URL" => Some("https://env.example".to_string()),
            "GITLAB_TOKEN" => Some("t0k".to_string()),
            _ => None,
        };
        let instance = select_instance(&BatchConfig::default(), None, env).unwrap();
        assert_eq!(instance.url, "https://env.example");
        assert_eq!(instance.private_token.as_deref(), Some("t0k"));
    }

    #[test]
    fn test_gb005_nothing_configured() {
        assert!(select_instance(&BatchConfig::default(), None, no_env).is_err());
    }

    #[test]
    fn test_gb005_later_files_override() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.yaml");
        std::fs::write(&first, TWO).unwrap();
        std::fs::write(&second, "instances:\n  lab:\n    url: https://override\n").unwrap();
        let config = load_config(&[first, second]).unwrap();
        assert_eq!(config.default.as_deref(), Some("mff"));
        assert_eq!(config.instances["lab"].url, "https://override");
        assert_eq!(config.instances.len(), 2);
    }

    #[test]
    fn test_gb005_invalid_yaml() {
        assert!(parse_config("instances: [").is_err());
    }
}
