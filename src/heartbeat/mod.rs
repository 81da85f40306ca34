//! # Heartbeat
//!
//! Background liveness monitoring. A [`HeartbeatRunner`] owns one spawned tokio
//! task that periodically builds a probe with a [`HeartbeatStrategy`], runs it
//! through a shared [`Device`](crate::device::Device) and reports every
//! outcome through an optional callback.
//!
//! ## Lifecycle
//!
//! ```text
//!  idle --start()--> running <--pause()/resume()--> paused
//!  running|paused --stop()--> stopped (task joined)
//! ```
//!
//! ## Failure escalation
//!
//! Each failing cycle emits [`HeartbeatEvent::Failure`]. When the consecutive
//! failure count reaches `max_failures` the same cycle also emits
//! [`HeartbeatEvent::MaxFailures`]; with `auto_reset_failures` the count then
//! starts over, so the escalation fires once per `max_failures` failures.

mod runner;
mod strategy;

pub use runner::{HeartbeatRunner, HeartbeatSuspend};
pub use strategy::{
    CustomHeartbeat, EchoHeartbeat, HeartbeatStrategy, PingHeartbeat, ScpiHeartbeat,
};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_MAX_FAILURES, DEFAULT_HEARTBEAT_TIMEOUT_MS,
};
use crate::error::{VdlError, VdlResult};

/// Heartbeat timing and escalation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Pause between probe cycles
    pub interval: Duration,
    /// Bound passed to `execute_with_timeout` for each probe
    pub timeout: Duration,
    /// Consecutive failures that trigger [`HeartbeatEvent::MaxFailures`]
    pub max_failures: u32,
    /// Honour [`HeartbeatRunner::suspend`] during exclusive command sequences
    pub pause_during_lock: bool,
    /// Reset the failure count on success and after escalation
    pub auto_reset_failures: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            max_failures: DEFAULT_HEARTBEAT_MAX_FAILURES,
            pause_during_lock: true,
            auto_reset_failures: true,
        }
    }
}

impl HeartbeatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn with_pause_during_lock(mut self, enabled: bool) -> Self {
        self.pause_during_lock = enabled;
        self
    }

    pub fn with_auto_reset_failures(mut self, enabled: bool) -> Self {
        self.auto_reset_failures = enabled;
        self
    }

    pub fn validate(&self) -> VdlResult<()> {
        if self.interval.is_zero() {
            return Err(VdlError::invalid_argument("heartbeat interval must be non-zero"));
        }
        if self.timeout.is_zero() {
            return Err(VdlError::invalid_argument("heartbeat timeout must be non-zero"));
        }
        if self.max_failures == 0 {
            return Err(VdlError::invalid_argument("max_failures must be at least 1"));
        }
        Ok(())
    }
}

/// Event reported to the heartbeat callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeartbeatEvent {
    Success,
    Failure,
    MaxFailures,
    Paused,
    Resumed,
    Stopped,
}

impl HeartbeatEvent {
    pub fn name(self) -> &'static str {
        match self {
            HeartbeatEvent::Success => "success",
            HeartbeatEvent::Failure => "failure",
            HeartbeatEvent::MaxFailures => "max_failures",
            HeartbeatEvent::Paused => "paused",
            HeartbeatEvent::Resumed => "resumed",
            HeartbeatEvent::Stopped => "stopped",
        }
    }
}

impl fmt::Display for HeartbeatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Heartbeat observer: event, current consecutive failure count, and the
/// error behind a failure event.
///
/// Runs on the heartbeat task; panics are caught and logged.
pub type HeartbeatCallback = Arc<dyn Fn(HeartbeatEvent, u32, Option<&VdlError>) + Send + Sync>;
