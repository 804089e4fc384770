mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use student_gym::plotting::render_trajectory;
use student_gym::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let base = match &cli.config {
        Some(path) => RolloutConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RolloutConfig::default(),
    };
    let config = cli.apply(base).context("invalid settings")?;

    let env = Environment::new(
        &config.base_url,
        &config.env_id,
        config.step_size,
        &[],
        config.seed,
    )
    .with_context(|| format!("creating {} at {}", config.env_id, config.base_url))?;
    tracing::info!(instance_id = env.instance_id(), "environment created");

    let trajectory = run_episode(env, config.max_steps, config.step_size, &mut TracingObserver)
        .context("episode failed")?;

    println!("\n{}", trajectory.summary());

    if cli.no_plots {
        return Ok(());
    }

    let sink = SvgSink::timestamped(&config.plot_dir)
        .with_context(|| format!("preparing {}", config.plot_dir.display()))?;
    let mut session = PlotSession::new(sink);
    if let Some(stats) = render_trajectory(&mut session, &trajectory, None)? {
        println!("\n{stats}");
    }
    session.finish()?;
    println!("\nFigures written to {}", session.sink().dir().display());

    Ok(())
}
