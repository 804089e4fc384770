extern crate rand;
extern crate reqwest;
extern crate serde;
extern crate serde_json;

pub mod common {
    pub mod utils;
}
pub mod config;
pub mod env;
pub mod error;
pub mod plotting;
pub mod rollout;

pub use config::RolloutConfig;
pub use env::*;
pub use error::{Error, ErrorCategory, Result};
pub use plotting::{
    render_observation_channels, render_reward_series, CapturingSink, Figure, FigureSink,
    PlotSession, RewardStats, SvgSink,
};
pub use rollout::{
    run_episode, EpisodeEnd, EpisodeSummary, NoopObserver, RolloutObserver, StepProgress,
    TracingObserver, Trajectory,
};

use rand::{rngs::StdRng, SeedableRng};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::ser::Serialize;
use serde_json::{to_value, Value};
use std::collections::HashMap;
use tracing::debug;
use value_extensions::*;

/// Handle on one environment instance hosted by the remote gym server.
/// NOTE: All APIs are sync, every call blocks until the server has answered.
#[derive(Debug)]
pub struct Environment {
    client: Client,
    api_url: String,
    instance_id: String,
    step_size: u32,
    obs_space: Space,
    act_space: Space,
    rng: StdRng,
}

impl Environment {
    /// Creates a fresh instance of `env_id` on the server, advancing `step_size`
    /// time units per `step` call.
    pub fn new(
        api_url: &str,
        env_id: &str,
        step_size: u32,
        kwargs: &[(&str, Value)],
        sample_seed: Option<u64>,
    ) -> Result<Self> {
        if step_size == 0 {
            return Err(Error::Config("step_size must be positive".into()));
        }

        let mut kwargs = kwargs.iter().cloned().collect::<HashMap<&str, Value>>();
        kwargs.insert("step_size", to_value(step_size)?);
        let body = HashMap::<&str, Value>::from([
            ("env_id", to_value(env_id)?),
            ("kwargs", to_value(kwargs)?),
        ]);

        let c = Client::new(api_url)?;
        let base_url = c.make_api_url("");
        let obj = c.http_post(&base_url, &body)?;
        let inst_id = obj["instance_id"]
            .as_str()
            .ok_or_else(|| Error::protocol(&base_url, "no instance_id returned"))?
            .to_string();

        Self::reference(c, &inst_id, step_size, sample_seed)
    }

    fn reference(
        client: Client,
        instance_id: &str,
        step_size: u32,
        sample_seed: Option<u64>,
    ) -> Result<Self> {
        let url = client.make_api_url(&format!("{instance_id}/observation_space/"));
        let obs_space = Space::from_json(as_object(&url, &client.http_get(&url)?["info"])?)?;

        let url = client.make_api_url(&format!("{instance_id}/action_space/"));
        let act_space = Space::from_json(as_object(&url, &client.http_get(&url)?["info"])?)?;
        act_space.ensure_maintenance_actions()?;

        let rng = match sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let api_url = client.make_api_url(&format!("{instance_id}/"));
        Ok(Self {
            client,
            api_url,
            instance_id: instance_id.to_string(),
            step_size,
            obs_space,
            act_space,
            rng,
        })
    }

    pub fn client_base_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn step_size(&self) -> u32 {
        self.step_size
    }

    /// The Space object corresponding to valid actions. For this environment it is always
    /// Discrete(3): do nothing, repair and sell.
    /// Refer: https://gymnasium.farama.org/api/env/#gymnasium.Env.action_space
    pub fn action_space(&self) -> &Space {
        &self.act_space
    }

    /// The Space object corresponding to valid observations, a Box of sensor channels.
    /// Refer: https://gymnasium.farama.org/api/env/#gymnasium.Env.observation_space
    pub fn observation_space(&self) -> &Space {
        &self.obs_space
    }

    fn make_api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }
}

impl EnvHandle for Environment {
    fn reset(&mut self, seed: Option<usize>) -> Result<(Observation, Info)> {
        let mut body = HashMap::new();
        if let Some(seed) = seed {
            body.insert("seed", to_value(seed)?);
        }

        let url = self.make_api_url("reset/");
        let obj = self.client.http_post(&url, &body)?;
        let observation = self.obs_space.parse_observation(&url, &obj["observation"])?;

        Ok((observation, obj["info"].clone()))
    }

    fn step(&mut self, action: Action) -> Result<StepInfo> {
        let req = HashMap::from([("action", to_value(action.code())?)]);

        let url = self.make_api_url("step/");
        let obj = self.client.http_post(&url, &req)?;

        StepInfo::from_json(&url, &obj, &self.obs_space)
    }

    fn close(&mut self) -> Result<()> {
        let url = self.make_api_url("close/");
        self.client
            .http_post(&url, &HashMap::<&str, Value>::new())
            .map(|_| ())
    }

    fn action_space_sample(&mut self) -> Result<Action> {
        self.act_space.sample_action(&mut self.rng)
    }
}

#[derive(Debug)]
pub struct Client {
    base_url: String,
    api_url: String,
    client: reqwest::blocking::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = base_url.replace("//localhost:", "//127.0.0.1:");
        if base_url.ends_with('/') {
            _ = base_url.remove(base_url.len() - 1);
        }

        let api_url = format!("{base_url}/v1/envs/");
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|source| Error::Http {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            base_url,
            api_url,
            client,
        })
    }

    pub fn make_api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http_get(&self, url: &str) -> Result<Value> {
        debug!(url, "GET");
        let res = self
            .client
            .get(url)
            .headers(Self::construct_common_headers())
            .send();
        Self::read_json(url, res)
    }

    fn http_post<T: Serialize>(&self, url: &str, body: &HashMap<&str, T>) -> Result<Value> {
        debug!(url, "POST");
        let res = self
            .client
            .post(url)
            .headers(Self::construct_common_headers())
            .json(body)
            .send();
        Self::read_json(url, res)
    }

    fn read_json(
        url: &str,
        res: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<Value> {
        let http = |source| Error::Http {
            url: url.to_string(),
            source,
        };
        let res = res.and_then(|r| r.error_for_status()).map_err(http)?;
        let text = res.text().map_err(http)?;
        Self::parse_body(url, &text)
    }

    /// close/ answers with an empty body, which reads as `null`.
    fn parse_body(url: &str, text: &str) -> Result<Value> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(text)
            .map_err(|e| Error::protocol(url, format!("response is not JSON: {e}")))
    }

    fn construct_common_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

mod value_extensions {
    use super::*;
    use serde_json::Map;

    static NULL: Value = Value::Null;

    pub fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a Value {
        obj.get(key).unwrap_or(&NULL)
    }

    pub fn as_object<'a>(endpoint: &str, val: &'a Value) -> Result<&'a Map<String, Value>> {
        val.as_object()
            .ok_or_else(|| Error::protocol(endpoint, format!("expected an object, got {val}")))
    }

    pub fn as_f64(endpoint: &str, val: &Value) -> Result<f64> {
        val.as_f64()
            .ok_or_else(|| Error::protocol(endpoint, format!("expected a number, got {val}")))
    }

    pub fn as_bool(endpoint: &str, val: &Value) -> Result<bool> {
        val.as_bool()
            .ok_or_else(|| Error::protocol(endpoint, format!("expected a bool, got {val}")))
    }

    pub fn as_discrete_item_vec(endpoint: &str, val: &Value) -> Result<Vec<Discrete>> {
        val.as_array()
            .ok_or_else(|| Error::protocol(endpoint, format!("expected an array, got {val}")))?
            .iter()
            .map(|x| {
                x.as_i64()
                    .map(|x| x as Discrete)
                    .ok_or_else(|| Error::protocol(endpoint, format!("expected an integer, got {x}")))
            })
            .collect()
    }

    pub fn as_continous_item_vec(endpoint: &str, val: &Value) -> Result<Vec<Continous>> {
        val.as_array()
            .ok_or_else(|| Error::protocol(endpoint, format!("expected an array, got {val}")))?
            .iter()
            .map(|x| as_f64(endpoint, x))
            .collect()
    }
}
