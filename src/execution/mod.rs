//! # Execution controls — [EXPANSION, ambient] (spec 4.K)
//!
//! `RunOptions` plus a cooperative `QueryTimeout`/`CancelHandle` pair
//! grounded on the teacher's `timeout.rs`/`limits.rs`, used by the
//! frontend's `run()`/`run_all()` entry points to implement the coarse
//! cancellation described in spec §5: the frontend has no fine-grained
//! cancel of in-flight engine work, only a cooperative flag the host can
//! set before tearing the process down.

mod limits;
mod timeout;

pub use limits::{MemoryTracker, ResourceError, ResourceLimits};
pub use timeout::{CancelHandle, QueryTimeout, TimeoutError};

use crate::config::MonitoringLevel;
use std::time::Duration;

/// Options accepted by `run()`/`run_all()` per spec §6.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// When true, intermediate column names are validated against the
    /// user-visible schema before lowering (catches accidental reuse of
    /// a dropped column's name).
    pub debug: bool,
    pub monitoring_level: MonitoringLevel,
    pub timeout: Option<Duration>,
    pub limits: ResourceLimits,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            debug: false,
            monitoring_level: MonitoringLevel::None,
            timeout: None,
            limits: ResourceLimits::default(),
        }
    }
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_monitoring(mut self, level: MonitoringLevel) -> Self {
        self.monitoring_level = level;
        self
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }
}
