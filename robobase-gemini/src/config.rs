//! Configuration of [`GeminiClient`](crate::GeminiClient).
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
    time::Duration,
};

/// Exponential backoff of retried requests.
///
/// The delay before attempt `k + 1` is `initial_delay_ms * multiplier^(k - 1)`,
/// capped by `max_delay_ms`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RetryConfig {
    /// The maximum number of attempts, including the first one.
    pub max_attempts: usize,

    /// Delay after the first failure in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound of delays in milliseconds.
    pub max_delay_ms: u64,

    /// Growth of delays.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Sets the maximum number of attempts.
    pub fn max_attempts(mut self, v: usize) -> Self {
        self.max_attempts = v;
        self
    }

    /// Sets the first delay.
    pub fn initial_delay_ms(mut self, v: u64) -> Self {
        self.initial_delay_ms = v;
        self
    }

    /// Sets the upper bound of delays.
    pub fn max_delay_ms(mut self, v: u64) -> Self {
        self.max_delay_ms = v;
        self
    }

    /// Sets the growth of delays.
    pub fn multiplier(mut self, v: f64) -> Self {
        self.multiplier = v;
        self
    }

    /// Delay after the `failures`-th consecutive failure.
    pub fn delay(&self, failures: usize) -> Duration {
        let exp = failures.saturating_sub(1).min(i32::MAX as usize) as i32;
        let ms = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_delay_ms as f64) as u64)
    }
}

/// Configuration of [`GeminiClient`](crate::GeminiClient).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GeminiConfig {
    /// Name of the model.
    pub model_type: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling probability.
    pub top_p: f32,

    /// The number of candidate tokens in sampling.
    pub top_k: u32,

    /// The maximum number of tokens in the answer.
    pub max_output_tokens: u32,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Endpoint of the API.
    pub base_url: String,

    /// Version of the API.
    pub api_version: String,

    /// Interval of polling the state of uploaded videos, in milliseconds.
    pub poll_interval_ms: u64,

    /// Timeout of each request in seconds.
    pub timeout_secs: u64,

    /// Backoff of retried requests.
    pub retry: RetryConfig,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model_type: "gemini-1.5-pro".to_string(),
            temperature: 0.0,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 64,
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_version: "v1beta".to_string(),
            poll_interval_ms: 3000,
            timeout_secs: 300,
            retry: RetryConfig::default(),
        }
    }
}

impl GeminiConfig {
    /// Sets the model name.
    pub fn model_type(mut self, v: impl Into<String>) -> Self {
        self.model_type = v.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, v: f32) -> Self {
        self.temperature = v;
        self
    }

    /// Sets the nucleus sampling probability.
    pub fn top_p(mut self, v: f32) -> Self {
        self.top_p = v;
        self
    }

    /// Sets the number of candidate tokens.
    pub fn top_k(mut self, v: u32) -> Self {
        self.top_k = v;
        self
    }

    /// Sets the maximum number of tokens in the answer.
    pub fn max_output_tokens(mut self, v: u32) -> Self {
        self.max_output_tokens = v;
        self
    }

    /// Sets the environment variable of the API key.
    pub fn api_key_env(mut self, v: impl Into<String>) -> Self {
        self.api_key_env = v.into();
        self
    }

    /// Sets the endpoint.
    pub fn base_url(mut self, v: impl Into<String>) -> Self {
        self.base_url = v.into();
        self
    }

    /// Sets the polling interval.
    pub fn poll_interval_ms(mut self, v: u64) -> Self {
        self.poll_interval_ms = v;
        self
    }

    /// Sets the backoff of retried requests.
    pub fn retry(mut self, v: RetryConfig) -> Self {
        self.retry = v;
        self
    }

    /// Constructs [`GeminiConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of GeminiClient from {:?}", path_);
        Ok(b)
    }

    /// Saves [`GeminiConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of GeminiClient into {:?}", path_);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_delay() {
        let config = RetryConfig::default()
            .initial_delay_ms(100)
            .max_delay_ms(1000)
            .multiplier(3.0);
        assert_eq!(config.delay(1), Duration::from_millis(100));
        assert_eq!(config.delay(2), Duration::from_millis(300));
        assert_eq!(config.delay(3), Duration::from_millis(900));
        assert_eq!(config.delay(4), Duration::from_millis(1000));
        assert_eq!(config.delay(100), Duration::from_millis(1000));
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let dir = TempDir::new("gemini_config")?;
        let path = dir.path().join("gemini.yaml");
        let config = GeminiConfig::default()
            .model_type("gemini-1.5-flash")
            .top_k(32)
            .retry(RetryConfig::default().max_attempts(3));
        config.save(&path)?;
        assert_eq!(GeminiConfig::load(&path)?, config);
        Ok(())
    }
}
