//! Worker configuration.
//!
//! [`WorkerConfig`] can be built in code or deserialized (e.g. from a JSON
//! config file). Missing timing fields fall back to the `DEFAULT_*` constants.
//!
//! ```
//! use mdp_worker::WorkerConfig;
//!
//! let config = WorkerConfig::from_json(
//!     r#"{ "broker": "tcp://localhost:5555", "service": "echo", "heartbeat_interval_ms": 1000 }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.heartbeat_interval().as_millis(), 1000);
//! assert_eq!(config.reconnect_delay().as_millis(), 2500);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MdpError, Result};
use crate::wire::DEFAULT_MAX_FRAME_SIZE;

/// Default heartbeat interval (also the poll timeout).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2500);

/// Default delay before a reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2500);

/// Idle poll intervals tolerated before the broker is presumed gone.
pub const HEARTBEAT_LIVENESS: u32 = 3;

/// Serializable worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Broker endpoint, e.g. `tcp://localhost:5555`.
    pub broker: String,
    /// Service name announced in READY.
    pub service: String,
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Maximum inbound frame size for socket transports.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY.as_millis() as u64
}

fn default_max_frame_size() -> u32 {
    DEFAULT_MAX_FRAME_SIZE
}

impl WorkerConfig {
    /// Create a config with default timings.
    pub fn new(broker: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            service: service.into(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_frame_size: default_max_frame_size(),
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reconnect delay as a `Duration`.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Check the invariants the worker relies on.
    ///
    /// - broker and service are non-blank
    /// - heartbeat interval and reconnect delay are non-zero
    /// - max frame size is non-zero
    pub fn validate(&self) -> Result<()> {
        require_non_blank("broker address", &self.broker)?;
        require_non_blank("service name", &self.service)?;
        require_non_zero("heartbeat interval", self.heartbeat_interval())?;
        require_non_zero("reconnect delay", self.reconnect_delay())?;

        if self.max_frame_size == 0 {
            return Err(MdpError::invalid_argument("max frame size must be positive"));
        }

        Ok(())
    }
}

pub(crate) fn require_non_blank(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MdpError::invalid_argument(format!(
            "{} must not be empty",
            what
        )));
    }
    Ok(())
}

pub(crate) fn require_non_zero(what: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(MdpError::invalid_argument(format!(
            "{} must be positive",
            what
        )));
    }
    Ok(())
}
