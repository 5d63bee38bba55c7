//! Durable job queue types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Lifecycle status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Dead,
}

impl JobStatus {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "done" => Self::Done,
            "failed" => Self::Failed,
            "dead" => Self::Dead,
            other => return Err(CoreError::InvalidJobStatus(other.to_owned())),
        })
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A unit of asynchronous work processed by the job worker.
///
/// `payload_json` carries whatever a given `job_type` handler needs; the
/// queue itself is agnostic to its shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub case_id: Option<Uuid>,
    pub job_type: String,
    pub status: JobStatus,
    pub payload_json: serde_json::Value,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Default number of attempts (including the first) before a job is
/// dead-lettered, matching `crate::constants::DEFAULT_MAX_ATTEMPTS`.
#[must_use]
pub fn default_max_attempts() -> i32 {
    crate::constants::DEFAULT_MAX_ATTEMPTS
}

/// Compute the next retry delay for a job that has failed `attempts` times,
/// using exponential back-off with full jitter, bounded by
/// `RETRY_MAX_DELAY_SECONDS`.
///
/// `attempts` is 1-indexed (the count of attempts made so far, including
/// the one that just failed). The returned delay is always >= the base
/// delay and monotonically non-decreasing in expectation as `attempts`
/// grows, though jitter means any single sample may be smaller than the
/// previous attempt's sample.
#[must_use]
pub fn compute_retry_delay_seconds(attempts: i32, jitter_fraction: f64) -> u64 {
    let base = crate::constants::RETRY_BASE_DELAY_SECONDS;
    let max = crate::constants::RETRY_MAX_DELAY_SECONDS;
    let exponent = attempts.max(1).saturating_sub(1).min(20) as u32;
    let backoff = base.saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
    let capped = backoff.min(max);
    let jittered = (capped as f64) * (1.0 - jitter_fraction.clamp(0.0, 1.0) * 0.5);
    (jittered.round() as u64).clamp(base, max)
}
