use std::env;
use std::time::Duration;

use clienthog_core::{CoreError, LogFormat};
use clienthog_edge::{
    DeviceId, EdgeError, ExtractorSpec, UnmatchedPolicy, DEFAULT_APPROVED_SOURCES,
    DEFAULT_FORWARD_TIMEOUT,
};
use thiserror::Error;

pub const CAMERA_ADDR_VAR: &str = "CLIENT_HOG_CAMERA_IP";
pub const FOG_ADDR_VAR: &str = "CLIENT_HOG_SERVER_IP";
pub const DEVICE_ID_VAR: &str = "CLIENT_HOG_DEVICE_UUID";
pub const TRACKED_VAR: &str = "CLIENT_HOG_TRACKED_ANIMALS";
pub const CONTROL_PORT_VAR: &str = "CLIENT_HOG_LOCAL_CONFIG_RECEIVER_PORT";

pub const APPROVED_SOURCES_VAR: &str = "CLIENT_HOG_APPROVED_SOURCES";
pub const UNMATCHED_POLICY_VAR: &str = "CLIENT_HOG_UNMATCHED_POLICY";
pub const EXTRACTOR_VAR: &str = "CLIENT_HOG_EXTRACTOR";
pub const FORWARD_TIMEOUT_VAR: &str = "CLIENT_HOG_FORWARD_TIMEOUT_MS";
pub const MAX_IN_FLIGHT_VAR: &str = "CLIENT_HOG_MAX_IN_FLIGHT";
pub const LOG_FORMAT_VAR: &str = "CLIENT_HOG_LOG_FORMAT";

const DEFAULT_CAMERA_ADDR: &str = "localhost:3333";
const DEFAULT_FOG_ADDR: &str = "localhost:3444";
const DEFAULT_DEVICE_ID: &str = "352";
const DEFAULT_TRACKED: &str = r#"["Bear","Racoon","Gazelle"]"#;
const DEFAULT_CONTROL_PORT: &str = ":3555";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CLIENT_HOG_DEVICE_UUID invalid: {0}")]
    DeviceId(#[source] EdgeError),

    #[error("CLIENT_HOG_TRACKED_ANIMALS is not a JSON array of strings: {0}")]
    TrackedEntities(#[source] serde_json::Error),

    #[error("{var} has invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("CLIENT_HOG_LOG_FORMAT invalid: {0}")]
    LogFormat(#[source] CoreError),
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub camera_addr: String,
    pub fog_addr: String,
    pub device_id: DeviceId,
    pub initial_entities: Vec<String>,
    pub control_addr: String,
    pub approved_sources: Vec<String>,
    pub unmatched_policy: UnmatchedPolicy,
    pub extractor: ExtractorSpec,
    pub forward_timeout: Duration,
    pub max_in_flight: Option<usize>,
    pub log_format: LogFormat,
    /// The core variables were incomplete and the built-in set was used.
    pub used_defaults: bool,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        // The five core variables fall back together, never one at a time.
        let core = (
            get(CAMERA_ADDR_VAR),
            get(FOG_ADDR_VAR),
            get(DEVICE_ID_VAR),
            get(TRACKED_VAR),
            get(CONTROL_PORT_VAR),
        );
        let (camera_addr, fog_addr, device_id, tracked, control_port, used_defaults) = match core {
            (Some(camera), Some(fog), Some(id), Some(tracked), Some(port)) => {
                (camera, fog, id, tracked, port, false)
            }
            _ => (
                DEFAULT_CAMERA_ADDR.to_string(),
                DEFAULT_FOG_ADDR.to_string(),
                DEFAULT_DEVICE_ID.to_string(),
                DEFAULT_TRACKED.to_string(),
                DEFAULT_CONTROL_PORT.to_string(),
                true,
            ),
        };

        let device_id = device_id.parse::<DeviceId>().map_err(ConfigError::DeviceId)?;
        let initial_entities: Vec<String> =
            serde_json::from_str(&tracked).map_err(ConfigError::TrackedEntities)?;

        let approved_sources: Vec<String> = match get(APPROVED_SOURCES_VAR) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_APPROVED_SOURCES.iter().map(|p| p.to_string()).collect(),
        };

        let unmatched_policy: UnmatchedPolicy = match get(UNMATCHED_POLICY_VAR) {
            Some(value) => value.parse().map_err(|e: EdgeError| ConfigError::InvalidValue {
                var: UNMATCHED_POLICY_VAR,
                value,
                reason: e.to_string(),
            })?,
            None => UnmatchedPolicy::default(),
        };

        let extractor: ExtractorSpec = match get(EXTRACTOR_VAR) {
            Some(value) => value.parse().map_err(|e: EdgeError| ConfigError::InvalidValue {
                var: EXTRACTOR_VAR,
                value,
                reason: e.to_string(),
            })?,
            None => ExtractorSpec::default(),
        };

        let forward_timeout = match get(FORWARD_TIMEOUT_VAR) {
            Some(value) => match value.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: FORWARD_TIMEOUT_VAR,
                        value,
                        reason: "expected a positive number of milliseconds".to_string(),
                    })
                }
            },
            None => DEFAULT_FORWARD_TIMEOUT,
        };

        let max_in_flight = match get(MAX_IN_FLIGHT_VAR) {
            Some(value) => match value.parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: MAX_IN_FLIGHT_VAR,
                        value,
                        reason: "expected a positive integer".to_string(),
                    })
                }
            },
            None => None,
        };

        let log_format: LogFormat = match get(LOG_FORMAT_VAR) {
            Some(value) => value.parse().map_err(ConfigError::LogFormat)?,
            None => LogFormat::default(),
        };

        Ok(RelayConfig {
            camera_addr,
            fog_addr,
            device_id,
            initial_entities,
            control_addr: control_bind_addr(&control_port),
            approved_sources,
            unmatched_policy,
            extractor,
            forward_timeout,
            max_in_flight,
            log_format,
            used_defaults,
        })
    }
}

/// A bare `:port` listens on every interface.
fn control_bind_addr(port: &str) -> String {
    if port.starts_with(':') {
        format!("0.0.0.0{port}")
    } else {
        port.to_string()
    }
}
