use crate::env::*;
use crate::error::{Error, Result};
use ndarray::Array2;
use std::fmt;
use tracing::{info, warn};

/// Why the step loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeEnd {
    Terminated,
    Truncated,
    BudgetExhausted,
}

/// Observations, actions and rewards of one episode, in step order.
///
/// `observations[0]` is the reset observation, so
/// `actions.len() == rewards.len() == observations.len() - 1` at all times.
#[derive(Debug, Clone)]
pub struct Trajectory {
    observations: Vec<Observation>,
    actions: Vec<Action>,
    rewards: Vec<f64>,
    episode_id: Option<String>,
    step_size: u32,
    end: Option<EpisodeEnd>,
}

impl Trajectory {
    pub fn new(initial: Observation, episode_id: Option<String>, step_size: u32) -> Self {
        Self {
            observations: vec![initial],
            actions: vec![],
            rewards: vec![],
            episode_id,
            step_size,
            end: None,
        }
    }

    /// Appends one transition. Observations must keep the width of the reset observation.
    pub fn record(&mut self, observation: Observation, action: Action, reward: f64) -> Result<()> {
        let expected = self.width();
        if observation.len() != expected {
            return Err(Error::ObservationWidth {
                step: self.len() + 1,
                expected,
                actual: observation.len(),
            });
        }

        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        Ok(())
    }

    fn finish(&mut self, end: EpisodeEnd) {
        self.end = Some(end);
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn rewards(&self) -> &[f64] {
        &self.rewards
    }

    pub fn episode_id(&self) -> Option<&str> {
        self.episode_id.as_deref()
    }

    pub fn step_size(&self) -> u32 {
        self.step_size
    }

    /// `None` while the rollout is still running.
    pub fn end(&self) -> Option<EpisodeEnd> {
        self.end
    }

    /// Number of steps taken.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Channels per observation.
    pub fn width(&self) -> usize {
        self.observations[0].len()
    }

    /// Simulated time units covered by the steps taken so far.
    pub fn elapsed(&self) -> u64 {
        self.len() as u64 * self.step_size as u64
    }

    pub fn total_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }

    /// Observations as a `(steps + 1) x width` matrix, one row per observation.
    pub fn observation_matrix(&self) -> Array2<f64> {
        let (rows, cols) = (self.observations.len(), self.width());
        Array2::from_shape_fn((rows, cols), |(r, c)| self.observations[r][c])
    }

    pub fn summary(&self) -> EpisodeSummary {
        let count = |a: Action| self.actions.iter().filter(|&&x| x == a).count();
        EpisodeSummary {
            steps: self.len(),
            elapsed: self.elapsed(),
            total_reward: self.total_reward(),
            repairs: count(Action::Repair),
            sells: count(Action::Sell),
        }
    }
}

/// Derived episode statistics, computed on demand from a [`Trajectory`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub steps: usize,
    pub elapsed: u64,
    pub total_reward: f64,
    pub repairs: usize,
    pub sells: usize,
}

impl fmt::Display for EpisodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Episode Summary:")?;
        writeln!(f, "   Total Steps: {}", self.steps)?;
        writeln!(f, "   Elapsed Time: {}", self.elapsed)?;
        writeln!(f, "   Total Reward: {:.2}", self.total_reward)?;
        write!(
            f,
            "   Actions Taken: {} repairs, {} sell",
            self.repairs, self.sells
        )
    }
}

/// Per-step progress handed to a [`RolloutObserver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepProgress {
    /// 1-based index of the step just taken.
    pub step: usize,
    pub elapsed: u64,
    pub action: Action,
    pub reward: f64,
    pub cumulative_reward: f64,
}

/// Receives human-readable progress of a rollout. Not part of the data contract.
pub trait RolloutObserver {
    fn on_reset(&mut self, _episode_id: Option<&str>, _observation: &Observation) {}

    fn on_step(&mut self, _progress: &StepProgress) {}

    fn on_episode_end(&mut self, _end: EpisodeEnd, _summary: &EpisodeSummary) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RolloutObserver for NoopObserver {}

/// Reports progress as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RolloutObserver for TracingObserver {
    fn on_reset(&mut self, episode_id: Option<&str>, observation: &Observation) {
        info!(
            episode_id = episode_id.unwrap_or("unknown"),
            channels = observation.len(),
            "starting episode"
        );
    }

    fn on_step(&mut self, p: &StepProgress) {
        info!(
            step = p.step,
            action = %p.action,
            "Step {}: Reward={:.2}, Total={:.2}",
            p.elapsed,
            p.reward,
            p.cumulative_reward
        );
    }

    fn on_episode_end(&mut self, end: EpisodeEnd, summary: &EpisodeSummary) {
        info!(
            ?end,
            steps = summary.steps,
            "Episode ended at step {} with total reward={:.2}",
            summary.elapsed,
            summary.total_reward
        );
    }
}

/// Keeps an environment open for the duration of one rollout and closes it exactly
/// once: through [`EpisodeScope::close`], or on drop if unwinding skipped that.
struct EpisodeScope<E: EnvHandle> {
    env: E,
    closed: bool,
}

impl<E: EnvHandle> EpisodeScope<E> {
    fn new(env: E) -> Self {
        Self { env, closed: false }
    }

    fn close(mut self) -> Result<()> {
        self.closed = true;
        self.env.close()
    }
}

impl<E: EnvHandle> Drop for EpisodeScope<E> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.env.close() {
                warn!(error = %e, "failed to close environment while unwinding");
            }
        }
    }
}

/// Runs one episode: reset, then up to `max_steps` sampled actions, stopping early as
/// soon as the environment reports `terminated` or `truncated`.
///
/// `step_size` is the number of time units the environment advances per step; it is
/// only used for elapsed-time bookkeeping. The environment is closed exactly once on
/// every exit path. Failures are not retried; when the rollout fails, a close failure
/// is logged and the original error is returned.
pub fn run_episode<E, O>(
    env: E,
    max_steps: usize,
    step_size: u32,
    observer: &mut O,
) -> Result<Trajectory>
where
    E: EnvHandle,
    O: RolloutObserver + ?Sized,
{
    let mut scope = EpisodeScope::new(env);
    let outcome = drive(&mut scope.env, max_steps, step_size, observer);

    match (outcome, scope.close()) {
        (Ok(trajectory), Ok(())) => Ok(trajectory),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "failed to close environment after rollout failure");
            Err(e)
        }
    }
}

fn drive<E, O>(
    env: &mut E,
    max_steps: usize,
    step_size: u32,
    observer: &mut O,
) -> Result<Trajectory>
where
    E: EnvHandle,
    O: RolloutObserver + ?Sized,
{
    if max_steps == 0 {
        return Err(Error::Config("max_steps must be positive".into()));
    }
    if step_size == 0 {
        return Err(Error::Config("step_size must be positive".into()));
    }

    let (observation, info) = env.reset(None)?;
    let id = episode_id(&info);
    observer.on_reset(id.as_deref(), &observation);
    let mut trajectory = Trajectory::new(observation, id, step_size);

    let mut end = EpisodeEnd::BudgetExhausted;
    for _ in 0..max_steps {
        let action = env.action_space_sample()?;
        let si = env.step(action)?;
        trajectory.record(si.observation, action, si.reward)?;

        observer.on_step(&StepProgress {
            step: trajectory.len(),
            elapsed: trajectory.elapsed(),
            action,
            reward: si.reward,
            cumulative_reward: trajectory.total_reward(),
        });

        if si.terminated {
            end = EpisodeEnd::Terminated;
            break;
        }
        if si.truncated {
            end = EpisodeEnd::Truncated;
            break;
        }
    }

    trajectory.finish(end);
    observer.on_episode_end(end, &trajectory.summary());

    Ok(trajectory)
}
