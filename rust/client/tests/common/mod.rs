use std::io;
use std::sync::{Arc, Mutex};
use student_gym::*;

/// What the scripted environment does on a given step.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Continue(f64),
    Terminate(f64),
    Truncate(f64),
    Fail,
    Panic,
}

/// Test double for `EnvHandle` replaying a fixed script of step outcomes.
#[derive(Debug, Default)]
pub struct ScriptedEnv {
    pub width: usize,
    pub script: Vec<Scripted>,
    pub samples: Vec<Action>,
    pub fail_reset: bool,
    pub fail_close: bool,
    pub resets: usize,
    pub steps: usize,
    pub closes: usize,
    pub applied: Vec<Action>,
}

#[allow(dead_code)]
impl ScriptedEnv {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            width: 9,
            script,
            ..Default::default()
        }
    }

    pub fn with_samples(mut self, samples: Vec<Action>) -> Self {
        self.samples = samples;
        self
    }

    fn observation(&self) -> Observation {
        vec![self.steps as f64; self.width]
    }
}

impl EnvHandle for ScriptedEnv {
    fn reset(&mut self, _seed: Option<usize>) -> Result<(Observation, Info)> {
        self.resets += 1;
        if self.fail_reset {
            return Err(Error::Environment("reset refused".into()));
        }
        Ok((
            self.observation(),
            serde_json::json!({"episode_id": "scripted-1"}),
        ))
    }

    fn step(&mut self, action: Action) -> Result<StepInfo> {
        let outcome = self
            .script
            .get(self.steps)
            .copied()
            .unwrap_or(Scripted::Continue(1.));
        self.steps += 1;
        self.applied.push(action);

        let (reward, terminated, truncated) = match outcome {
            Scripted::Continue(r) => (r, false, false),
            Scripted::Terminate(r) => (r, true, false),
            Scripted::Truncate(r) => (r, false, true),
            Scripted::Fail => {
                return Err(Error::Environment(format!("step {} failed", self.steps)))
            }
            Scripted::Panic => panic!("simulator crashed"),
        };

        Ok(StepInfo {
            observation: self.observation(),
            reward,
            terminated,
            truncated,
            info: serde_json::Value::Null,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        if self.fail_close {
            return Err(Error::Environment("close refused".into()));
        }
        Ok(())
    }

    fn action_space_sample(&mut self) -> Result<Action> {
        if self.samples.is_empty() {
            return Ok(Action::DoNothing);
        }
        Ok(self.samples[self.steps % self.samples.len()])
    }
}

/// Records everything the driver reports.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub episode_id: Option<String>,
    pub progress: Vec<StepProgress>,
    pub end: Option<(EpisodeEnd, EpisodeSummary)>,
}

impl RolloutObserver for RecordingObserver {
    fn on_reset(&mut self, episode_id: Option<&str>, _observation: &Observation) {
        self.episode_id = episode_id.map(str::to_string);
    }

    fn on_step(&mut self, progress: &StepProgress) {
        self.progress.push(*progress);
    }

    fn on_episode_end(&mut self, end: EpisodeEnd, summary: &EpisodeSummary) {
        self.end = Some((end, *summary));
    }
}

/// Shared in-memory target for formatted log lines.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a thread-local subscriber and returns its result with everything logged.
#[allow(dead_code)]
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = LogBuffer::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let out = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    (out, logs)
}
