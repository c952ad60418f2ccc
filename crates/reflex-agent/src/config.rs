//! Run configuration

use std::time::Duration;

use reflex_ai::SamplingParams;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Model selection for one step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl StepConfig {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature: Some(temperature),
            max_tokens: None,
        }
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Configuration for a conversation or reflection run.
///
/// Validated once on entry; see [`RunConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Model calls allowed per conversation
    pub max_turns: u32,
    /// Artifact versions to produce at most (draft counts as the first)
    pub max_iterations: u32,
    pub stop_on_convergence: bool,
    /// Change below this value counts as converged
    pub convergence_threshold: f64,
    /// Critique attempts before giving up on structured output
    pub max_retries: u32,
    /// Overrides the prompt set's system instruction
    pub system_prompt: Option<String>,
    pub draft: StepConfig,
    pub reflection: StepConfig,
    pub revision: StepConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_iterations: 2,
            stop_on_convergence: true,
            convergence_threshold: 0.05,
            max_retries: 3,
            system_prompt: None,
            draft: StepConfig::new("gpt-4o-mini", 1.0),
            reflection: StepConfig::new("gpt-4o", 1.0),
            revision: StepConfig::new("gpt-4o", 0.7),
        }
    }
}

impl RunConfig {
    /// Use one model for every step
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.draft.model = model.clone();
        self.reflection.model = model.clone();
        self.revision.model = model;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_turns < 1 {
            return Err(Error::ConfigValidation("max_turns must be at least 1".into()));
        }
        if self.max_iterations < 1 {
            return Err(Error::ConfigValidation(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.max_retries < 1 {
            return Err(Error::ConfigValidation("max_retries must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.convergence_threshold) {
            return Err(Error::ConfigValidation(format!(
                "convergence_threshold must be within [0, 1], got {}",
                self.convergence_threshold
            )));
        }
        for (step, cfg) in [
            ("draft", &self.draft),
            ("reflection", &self.reflection),
            ("revision", &self.revision),
        ] {
            if cfg.model.trim().is_empty() {
                return Err(Error::ConfigValidation(format!("{} model is empty", step)));
            }
            if let Some(t) = cfg.temperature.filter(|t| !(0.0..=2.0).contains(t)) {
                return Err(Error::ConfigValidation(format!(
                    "{} temperature must be within [0, 2], got {}",
                    step, t
                )));
            }
        }
        Ok(())
    }
}

/// Tool executor limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Concurrent calls per batch; `None` runs the whole batch at once
    pub max_concurrency: Option<usize>,
    /// Per-call limit, applied independently to each call
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == Some(0) {
            return Err(Error::ConfigValidation(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::ConfigValidation(
                "call_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.max_turns, 10);
        assert_eq!(cfg.max_iterations, 2);
        assert!(cfg.stop_on_convergence);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.revision.temperature, Some(0.7));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let cfg = RunConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_rejects_zero_turns_and_retries() {
        let cfg = RunConfig {
            max_turns: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = RunConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_executor_limits_validated() {
        assert!(ExecutorConfig::default().validate().is_ok());
        let zero_timeout = ExecutorConfig {
            call_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            zero_timeout.validate(),
            Err(Error::ConfigValidation(_))
        ));
        let zero_cap = ExecutorConfig {
            max_concurrency: Some(0),
            ..Default::default()
        };
        assert!(zero_cap.validate().is_err());
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let cfg = RunConfig {
            convergence_threshold: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_model() {
        let cfg = RunConfig::default().with_model(" ");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_executor_config_from_json() {
        let cfg: ExecutorConfig =
            serde_json::from_str(r#"{"max_concurrency": 4, "call_timeout": 2.5}"#).unwrap();
        assert_eq!(cfg.max_concurrency, Some(4));
        assert_eq!(cfg.call_timeout, Duration::from_millis(2500));
    }
}
