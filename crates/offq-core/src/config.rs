//! Queue configuration.
//!
//! Every field has a default; `from_env` overrides them from `OFFQ_*`
//! variables:
//!
//! | variable                   | field                 | default          |
//! |----------------------------|-----------------------|------------------|
//! | `OFFQ_STORAGE_KEY`         | `storage_key`         | `offline_queue`  |
//! | `OFFQ_MAX_RETRIES`         | `default_max_retries` | 3                |
//! | `OFFQ_BASE_DELAY_MS`       | `base_delay_ms`       | 1000             |
//! | `OFFQ_MAX_DELAY_MS`        | `max_delay_ms`        | 60000            |
//! | `OFFQ_MAX_SESSION_RETRIES` | `max_session_retries` | 50               |
//! | `OFFQ_PROCESS_ON_ENQUEUE`  | `process_on_enqueue`  | true             |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_STORAGE_KEY;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Key the job snapshot is persisted under.
    pub storage_key: String,

    /// `max_retries` for jobs enqueued without options.
    pub default_max_retries: u32,

    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_session_retries: u32,

    /// Trigger a processing pass after every enqueue.
    pub process_on_enqueue: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            default_max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            max_session_retries: 50,
            process_on_enqueue: true,
        }
    }
}

impl QueueConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            storage_key: lookup("OFFQ_STORAGE_KEY")
                .filter(|key| !key.is_empty())
                .unwrap_or(defaults.storage_key),
            default_max_retries: parse_var(
                &lookup,
                "OFFQ_MAX_RETRIES",
                defaults.default_max_retries,
            )?,
            base_delay_ms: parse_var(&lookup, "OFFQ_BASE_DELAY_MS", defaults.base_delay_ms)?,
            max_delay_ms: parse_var(&lookup, "OFFQ_MAX_DELAY_MS", defaults.max_delay_ms)?,
            max_session_retries: parse_var(
                &lookup,
                "OFFQ_MAX_SESSION_RETRIES",
                defaults.max_session_retries,
            )?,
            process_on_enqueue: parse_bool(
                &lookup,
                "OFFQ_PROCESS_ON_ENQUEUE",
                defaults.process_on_enqueue,
            )?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { var, value }),
        },
    }
}
