use crate::common::utils::deserialize_binary_stream;
use crate::error::{Error, Result};
use crate::value_extensions::*;
use rand::Rng;
use serde_json::{Map, Value};
use std::fmt;

pub type Discrete = i32;
pub type Continous = f64;

/// One aggregate sensor reading returned after the environment has advanced
/// `step_size` time units. Every observation of an episode has the same width.
pub type Observation = Vec<Continous>;

/// Free-form per-call metadata returned by the server.
pub type Info = Value;

/// Maintenance decision applied at every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    DoNothing = 0,
    Repair = 1,
    Sell = 2,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::DoNothing, Action::Repair, Action::Sell];

    pub fn code(self) -> Discrete {
        self as Discrete
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::DoNothing => "Do Nothing",
            Action::Repair => "Repair",
            Action::Sell => "Sell",
        }
    }
}

impl TryFrom<i64> for Action {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Action::DoNothing),
            1 => Ok(Action::Repair),
            2 => Ok(Action::Sell),
            v => Err(Error::InvalidAction(v)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

#[derive(Debug, Clone)]
pub struct StepInfo {
    pub observation: Observation,
    pub reward: f64,
    pub truncated: bool,
    pub terminated: bool,
    pub info: Info,
}

impl StepInfo {
    /// Maps a `step/` response onto a `StepInfo`, checking the observation against
    /// `obs_space`.
    pub fn from_json(endpoint: &str, obj: &Value, obs_space: &Space) -> Result<Self> {
        Ok(Self {
            observation: obs_space.parse_observation(endpoint, &obj["observation"])?,
            reward: as_f64(endpoint, &obj["reward"])?,
            truncated: as_bool(endpoint, &obj["truncated"])?,
            terminated: as_bool(endpoint, &obj["terminated"])?,
            info: obj["info"].clone(),
        })
    }

    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// The capability set the rollout driver relies on. The HTTP [`crate::Environment`]
/// is the real implementation; tests substitute scripted doubles.
pub trait EnvHandle {
    fn reset(&mut self, seed: Option<usize>) -> Result<(Observation, Info)>;

    fn step(&mut self, action: Action) -> Result<StepInfo>;

    fn close(&mut self) -> Result<()>;

    fn action_space_sample(&mut self) -> Result<Action>;
}

impl<E: EnvHandle + ?Sized> EnvHandle for &mut E {
    fn reset(&mut self, seed: Option<usize>) -> Result<(Observation, Info)> {
        (**self).reset(seed)
    }

    fn step(&mut self, action: Action) -> Result<StepInfo> {
        (**self).step(action)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn action_space_sample(&mut self) -> Result<Action> {
        (**self).action_space_sample()
    }
}

/// Episode identifier carried in `info`, if the server supplied one.
pub fn episode_id(info: &Info) -> Option<String> {
    match info.get("episode_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        v => Some(v.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Space {
    /// Refer: https://gymnasium.farama.org/api/spaces/fundamental/#discrete
    Discrete { n: Discrete },

    /// Refer: https://gymnasium.farama.org/api/spaces/fundamental/#box
    Box {
        shape: Vec<Discrete>,
        high: Vec<Continous>,
        low: Vec<Continous>,
    },
}

impl Space {
    pub fn from_json(info: &Map<String, Value>) -> Result<Self> {
        let endpoint = "space info";
        let name = info
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol(endpoint, "missing space name"))?;

        match name {
            "Discrete" => {
                let n = info
                    .get("n")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| Error::protocol(endpoint, "Discrete space without n"))?;
                Ok(Space::Discrete { n: n as Discrete })
            }
            "Box" => Ok(Space::Box {
                shape: as_discrete_item_vec(endpoint, field(info, "shape"))?,
                high: as_continous_item_vec(endpoint, field(info, "high"))?,
                low: as_continous_item_vec(endpoint, field(info, "low"))?,
            }),
            e => Err(Error::protocol(
                endpoint,
                format!("unsupported space name: {e}"),
            )),
        }
    }

    /// Number of scalar entries a single element of this space holds.
    pub fn width(&self) -> usize {
        match self {
            Space::Discrete { .. } => 1,
            Space::Box { shape, .. } => shape.iter().map(|&d| d.max(0) as usize).product(),
        }
    }

    /// Decodes an observation sent either as a plain array or packed as
    /// `{"dtype": "float64", "data": <base64 zlib>}`. Its length must match [`Space::width`].
    pub fn parse_observation(&self, endpoint: &str, val: &Value) -> Result<Observation> {
        let obs = match val {
            Value::Array(_) => as_continous_item_vec(endpoint, val)?,
            Value::Object(packed) => {
                let dtype = field(packed, "dtype")
                    .as_str()
                    .ok_or_else(|| Error::protocol(endpoint, "packed observation without dtype"))?;
                let data = field(packed, "data")
                    .as_str()
                    .ok_or_else(|| Error::protocol(endpoint, "packed observation without data"))?;
                deserialize_binary_stream::<f64>(dtype, data)?
            }
            v => return Err(Error::protocol(endpoint, format!("unexpected observation {v}"))),
        };

        let width = self.width();
        if obs.len() != width {
            return Err(Error::protocol(
                endpoint,
                format!("observation has {} values, space declares {width}", obs.len()),
            ));
        }

        Ok(obs)
    }

    /// Only the three maintenance actions are understood.
    pub fn ensure_maintenance_actions(&self) -> Result<()> {
        match self {
            Space::Discrete { n: 3 } => Ok(()),
            s => Err(Error::Config(format!(
                "expected a Discrete(3) maintenance action space, server reports {s:?}"
            ))),
        }
    }

    /// Uniformly samples an action from a discrete space of maintenance actions.
    pub fn sample_action<R: Rng>(&self, rng: &mut R) -> Result<Action> {
        match self {
            Space::Discrete { n } if *n > 0 => Action::try_from(rng.gen_range(0..*n) as i64),
            s => Err(Error::Config(format!(
                "cannot sample a maintenance action from {s:?}"
            ))),
        }
    }
}
