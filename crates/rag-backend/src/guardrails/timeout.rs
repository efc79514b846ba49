use std::time::{Duration, Instant};

use thiserror::Error;

use crate::utils::error::ApiError;

/// Raised when a pipeline stage would start with insufficient time left in
/// the global query budget.
#[derive(Debug, Error)]
#[error("Query execution exceeded the configured timeout.")]
pub struct QueryTimeoutError {
    pub timeout_seconds: u64,
    pub elapsed_ms: f64,
    pub stages_completed: u32,
}

impl From<QueryTimeoutError> for ApiError {
    fn from(err: QueryTimeoutError) -> Self {
        ApiError::Timeout {
            message: err.to_string(),
            timeout_seconds: err.timeout_seconds,
            elapsed_ms: err.elapsed_ms,
            stages_completed: err.stages_completed,
        }
    }
}

/// Tracks one wall-clock deadline across the query pipeline stages.
///
/// The deadline is computed on entry as `now + timeout_seconds` with the
/// timeout clamped to [1, 120] seconds. Each stage asserts a minimum
/// remaining budget before starting.
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    pub timeout_seconds: u64,
    start_time: Instant,
    deadline: Instant,
}

impl TimeoutManager {
    pub fn new(timeout_seconds: u64) -> Self {
        let timeout_seconds = timeout_seconds.clamp(1, 120);
        let start_time = Instant::now();
        TimeoutManager {
            timeout_seconds,
            start_time,
            deadline: start_time + Duration::from_secs(timeout_seconds),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }

    /// Remaining time in seconds before the deadline; negative when past it.
    pub fn remaining_seconds(&self) -> f64 {
        let now = Instant::now();
        if now >= self.deadline {
            -((now - self.deadline).as_secs_f64())
        } else {
            (self.deadline - now).as_secs_f64()
        }
    }

    /// Fail fast when less than `min_required_seconds` remain.
    pub fn assert_time_available(
        &self,
        min_required_seconds: f64,
        stage_name: &str,
        stages_completed: u32,
    ) -> Result<(), QueryTimeoutError> {
        let remaining = self.remaining_seconds();
        if remaining < min_required_seconds {
            tracing::warn!(
                stage = stage_name,
                stages_completed,
                remaining_seconds = remaining,
                timeout_seconds = self.timeout_seconds,
                "timeout_exceeded_before_stage"
            );
            return Err(QueryTimeoutError {
                timeout_seconds: self.timeout_seconds,
                elapsed_ms: self.elapsed_ms(),
                stages_completed,
            });
        }
        Ok(())
    }

    pub fn log_stage_timing(&self, stage_name: &str, stage_latency_ms: f64) {
        tracing::info!(
            stage = stage_name,
            latency_ms = stage_latency_ms,
            elapsed_ms = self.elapsed_ms(),
            timeout_seconds = self.timeout_seconds,
            "stage_complete"
        );
    }
}
