use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one rollout against the remote environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RolloutConfig {
    /// Root of the gym HTTP server, e.g. `http://127.0.0.1:40004`.
    pub base_url: String,
    pub env_id: String,
    /// Simulated time units the server advances per `step` call.
    pub step_size: u32,
    /// Upper bound on `step` calls per episode.
    pub max_steps: usize,
    /// Seeds the local action sampler, entropy when unset.
    pub seed: Option<u64>,
    /// Figures are written below this directory.
    pub plot_dir: PathBuf,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:40004".to_string(),
            env_id: "StudentGym-v0".to_string(),
            step_size: 10,
            max_steps: 50,
            seed: None,
            plot_dir: PathBuf::from("plots"),
        }
    }
}

impl RolloutConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_size == 0 {
            return Err(Error::Config("step_size must be positive".into()));
        }
        if self.max_steps == 0 {
            return Err(Error::Config("max_steps must be positive".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base_url '{}' is not an http(s) url",
                self.base_url
            )));
        }
        Ok(())
    }
}
