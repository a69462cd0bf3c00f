//! Configuration for answering questions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// How a question is turned into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Condense, retrieve, then one completion over the retrieved context.
    #[default]
    FixedPipeline,
    /// The model drives a tool loop and retrieves when it decides to.
    Agentic,
}

/// Default first assistant message of a conversation.
pub const DEFAULT_GREETING: &str = "Hello! How can I help you today?";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub mode: AnswerMode,
    /// Sampling temperature for every completion. `None` leaves the model default.
    pub temperature: Option<f32>,
    /// Model calls allowed per agentic turn.
    pub max_agent_steps: usize,
    /// Upper bound on any single language model call.
    pub service_timeout_secs: u64,
    /// Assistant message that opens every fresh conversation.
    pub greeting: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: AnswerMode::default(),
            temperature: Some(0.1),
            max_agent_steps: 5,
            service_timeout_secs: 60,
            greeting: Some(DEFAULT_GREETING.to_string()),
        }
    }
}

impl ChatConfig {
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_agent_steps == 0 {
            return Err(ChatError::ConfigError(
                "max_agent_steps must be greater than zero".to_string(),
            ));
        }
        if self.service_timeout_secs == 0 {
            return Err(ChatError::ConfigError(
                "service_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ChatError::ConfigError(format!(
                    "temperature must be between 0 and 2 (got {t})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    pub fn mode(mut self, mode: AnswerMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_agent_steps(mut self, steps: usize) -> Self {
        self.config.max_agent_steps = steps;
        self
    }

    pub fn service_timeout_secs(mut self, secs: u64) -> Self {
        self.config.service_timeout_secs = secs;
        self
    }

    pub fn greeting(mut self, greeting: Option<String>) -> Self {
        self.config.greeting = greeting;
        self
    }

    pub fn build(self) -> Result<ChatConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.mode, AnswerMode::FixedPipeline);
        assert_eq!(config.temperature, Some(0.1));
        assert_eq!(config.max_agent_steps, 5);
        config.validate().unwrap();
    }

    #[test]
    fn zero_steps_rejected() {
        assert!(ChatConfig::builder().max_agent_steps(0).build().is_err());
    }

    #[test]
    fn mode_deserializes_from_snake_case() {
        let config: ChatConfig = serde_json::from_str(r#"{"mode": "agentic"}"#).unwrap();
        assert_eq!(config.mode, AnswerMode::Agentic);
        assert_eq!(config.max_agent_steps, 5);
    }
}
