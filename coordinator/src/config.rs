use std::{fs, path::Path, time::Duration};

use clap::ValueEnum;
use comms::specs::{DistributionSpec, LayerSpec, ModelSpec, ParamGenSpec};
use serde::{Deserialize, Serialize};

use crate::error::ConfigErr;

/// The amount of input features of the default model.
pub const DEFAULT_FEATURES: usize = 4;

/// What to do with a round whose deadline passed before every expected client submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Average whatever was received.
    #[default]
    #[value(name = "aggregate")]
    AggregateReceived,
    /// Discard the round and keep the current global model.
    #[value(name = "fail")]
    FailRound,
}

/// How long a round may wait for stragglers, and what happens after.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundPolicy {
    /// Measured from the moment the barrier forms, `None` waits forever.
    pub timeout: Option<Duration>,
    pub on_timeout: TimeoutAction,
}

/// The coordinator's configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    pub model: ModelSpec,
    pub seed: Option<u64>,
    pub round_timeout_secs: Option<u64>,
    pub on_timeout: TimeoutAction,
    pub watchdog_interval_ms: u64,
    pub max_body_bytes: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5001,
            model: default_model(DEFAULT_FEATURES),
            seed: None,
            round_timeout_secs: None,
            on_timeout: TimeoutAction::default(),
            watchdog_interval_ms: 1000,
            max_body_bytes: 256 * 1024 * 1024,
        }
    }
}

impl CoordinatorConfig {
    /// Reads a json configuration, absent fields take their default values.
    ///
    /// # Arguments
    /// * `path` - The path of the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigErr> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.model.layers.is_empty() {
            return Err(ConfigErr::Invalid("the model has no layers".into()));
        }

        if self.round_timeout_secs == Some(0) {
            return Err(ConfigErr::Invalid("round_timeout_secs must be positive".into()));
        }

        if self.watchdog_interval_ms == 0 {
            return Err(ConfigErr::Invalid(
                "watchdog_interval_ms must be positive".into(),
            ));
        }

        Ok(())
    }

    pub fn policy(&self) -> RoundPolicy {
        RoundPolicy {
            timeout: self.round_timeout_secs.map(Duration::from_secs),
            on_timeout: self.on_timeout,
        }
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    /// The address to listen at.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A linear model over `features` inputs: a `1 x features` kernel plus a bias.
pub fn default_model(features: usize) -> ModelSpec {
    ModelSpec {
        layers: vec![
            LayerSpec {
                shape: vec![1, features],
                init: ParamGenSpec::Rand {
                    distribution: DistributionSpec::XavierUniform {
                        fan_in: features,
                        fan_out: 1,
                    },
                },
            },
            LayerSpec {
                shape: vec![1],
                init: ParamGenSpec::Const { value: 0. },
            },
        ],
    }
}
