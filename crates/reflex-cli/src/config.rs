//! Configuration file support

use anyhow::Context;
use reflex_agent::{ExecutorConfig, RunConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for reflex
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend API shape (chat-completions, responses)
    pub backend: Option<String>,
    /// Base URL of an OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// Model used for every step unless a step overrides it
    pub model: Option<String>,
    /// Where artifacts are written
    pub output_dir: Option<String>,
    pub save_artifacts: Option<bool>,
    /// Change metric between versions (diff_ratio, size_delta)
    pub metric: Option<String>,
    /// Iteration, turn and per-step model settings
    pub run: RunConfig,
    pub executor: ExecutorConfig,
    /// API keys (alternative to environment variables)
    pub api_keys: ApiKeys,
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub tavily: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reflex")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("REFLEX_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}", e);
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Write the example config if no file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// Get API key for a service, checking config then env
    pub fn get_api_key(&self, service: &str) -> Option<String> {
        let from_config = match service {
            "openai" => self.api_keys.openai.clone(),
            "tavily" => self.api_keys.tavily.clone(),
            _ => None,
        };
        if from_config.as_deref().is_some_and(|k| !k.is_empty()) {
            return from_config;
        }

        let env_var = match service {
            "openai" => "OPENAI_API_KEY",
            "tavily" => "TAVILY_API_KEY",
            _ => return None,
        };
        std::env::var(env_var).ok().filter(|k| !k.is_empty())
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# reflex configuration file
# Place at ~/.config/reflex/config.toml (Linux), ~/Library/Application Support/reflex/config.toml
# (macOS) or %APPDATA%\reflex\config.toml (Windows), or point REFLEX_CONFIG_PATH at it.

# Backend API shape: "responses" or "chat-completions"
backend = "responses"

# OpenAI-compatible endpoint (optional)
# base_url = "https://api.openai.com/v1"

# Use one model for every step (optional; per-step settings below win otherwise)
# model = "gpt-4o"

output_dir = "."
save_artifacts = true

# Change metric between versions: "diff_ratio" or "size_delta"
metric = "diff_ratio"

[run]
max_turns = 10
max_iterations = 2
stop_on_convergence = true
convergence_threshold = 0.05
max_retries = 3

[run.draft]
model = "gpt-4o-mini"
temperature = 1.0

[run.reflection]
model = "gpt-4o"
temperature = 1.0

[run.revision]
model = "gpt-4o"
temperature = 0.7

[executor]
# max_concurrency = 4
call_timeout = 60.0

# API keys (optional - can also use OPENAI_API_KEY and TAVILY_API_KEY)
[api_keys]
# openai = "sk-..."
# tavily = "tvly-..."
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.backend.as_deref(), Some("responses"));
        assert_eq!(config.run.max_iterations, 2);
        assert_eq!(config.run.revision.temperature, Some(0.7));
        assert_eq!(config.executor.call_timeout, Duration::from_secs(60));
        assert_eq!(config.metric.as_deref(), Some("diff_ratio"));
        assert!(config.run.validate().is_ok());
        assert!(config.executor.validate().is_ok());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = \"gpt-4.1\"\n[run]\nmax_iterations = 4\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(config.run.max_iterations, 4);
        assert_eq!(config.run.max_turns, 10);
        assert_eq!(config.run.draft.model, "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[run\nmax_turns = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.toml"));
    }

    #[test]
    fn test_api_key_from_config() {
        let config = Config {
            api_keys: ApiKeys {
                openai: Some("sk-test".into()),
                tavily: None,
            },
            ..Config::default()
        };
        assert_eq!(config.get_api_key("openai").as_deref(), Some("sk-test"));
        assert_eq!(config.get_api_key("unknown"), None);
    }
}
