use clap::Parser;
use std::path::PathBuf;
use student_gym::RolloutConfig;

/// Runs one random-policy episode against the student gym server and plots it.
#[derive(Parser, Debug)]
#[command(name = "single-trajectory", version)]
pub struct Cli {
    /// JSON config file; flags override its values.
    #[arg(short, long, env = "STUDENT_GYM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root url of the gym HTTP server.
    #[arg(long, env = "STUDENT_GYM_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "STUDENT_GYM_ENV_ID")]
    pub env_id: Option<String>,

    /// Time units advanced per step.
    #[arg(long, env = "STUDENT_GYM_STEP_SIZE")]
    pub step_size: Option<u32>,

    /// Step budget of the episode.
    #[arg(short = 'n', long, env = "STUDENT_GYM_MAX_STEPS")]
    pub max_steps: Option<usize>,

    /// Seed for the action sampler.
    #[arg(long, env = "STUDENT_GYM_SEED")]
    pub seed: Option<u64>,

    #[arg(long, env = "STUDENT_GYM_PLOT_DIR")]
    pub plot_dir: Option<PathBuf>,

    /// Skip rendering figures.
    #[arg(long)]
    pub no_plots: bool,
}

impl Cli {
    /// Layers the flags over `base` and validates the result.
    pub fn apply(&self, base: RolloutConfig) -> student_gym::Result<RolloutConfig> {
        let c = RolloutConfig {
            base_url: self.base_url.clone().unwrap_or(base.base_url),
            env_id: self.env_id.clone().unwrap_or(base.env_id),
            step_size: self.step_size.unwrap_or(base.step_size),
            max_steps: self.max_steps.unwrap_or(base.max_steps),
            seed: self.seed.or(base.seed),
            plot_dir: self.plot_dir.clone().unwrap_or(base.plot_dir),
        };
        c.validate()?;
        Ok(c)
    }
}
