use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::PlatformApi;
use crate::types::{JobHandle, JobState, JobStatus, PlatformError};

/// Pause between polls. Injected so tests run without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns at once and remembers every requested pause.
#[derive(Default)]
pub struct ImmediateSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl ImmediateSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for ImmediateSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Fixed-interval polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSchedule {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

impl PollSchedule {
    pub fn new(interval_secs: u64, max_attempts: u32) -> Self {
        Self {
            interval_secs,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Worst-case wall time spent sleeping under this schedule.
    /// Saturates at `Duration::MAX`.
    pub fn budget(&self) -> Duration {
        self.interval()
            .checked_mul(self.max_attempts.saturating_sub(1))
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("job {job} failed: {detail}")]
    JobFailed {
        job: JobHandle,
        detail: String,
        payload: serde_json::Value,
    },

    #[error("job {job} still running after {attempts} attempts")]
    JobTimeout { job: JobHandle, attempts: u32 },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub type PollResult<T> = Result<T, PollError>;

/// Waits for platform jobs to reach a terminal state. Knows nothing about
/// what a job does; every asynchronous call goes through [`JobPoller::wait_for`].
pub struct JobPoller {
    api: Arc<dyn PlatformApi>,
    sleeper: Arc<dyn Sleeper>,
}

impl JobPoller {
    pub fn new(api: Arc<dyn PlatformApi>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { api, sleeper }
    }

    /// Fetch the job up to `schedule.max_attempts` times, sleeping only
    /// between fetches. A failed job is returned as an error immediately and
    /// is never re-polled.
    pub async fn wait_for(&self, job: &JobHandle, schedule: PollSchedule) -> PollResult<JobStatus> {
        for attempt in 1..=schedule.max_attempts {
            if attempt > 1 {
                self.sleeper.sleep(schedule.interval()).await;
            }

            let status = self.api.get_job(job).await?;
            match status.state {
                JobState::Succeeded => {
                    info!(job = %job, attempt, "Job complete");
                    return Ok(status);
                }
                JobState::Failed => {
                    let detail = status.failure_detail();
                    warn!(job = %job, attempt, detail = %detail, "Job failed");
                    return Err(PollError::JobFailed {
                        job: job.clone(),
                        detail,
                        payload: status.payload,
                    });
                }
                JobState::Running => {
                    debug!(job = %job, attempt, max = schedule.max_attempts, "Job still running");
                }
            }
        }

        warn!(
            job = %job,
            attempts = schedule.max_attempts,
            waited_secs = schedule.budget().as_secs(),
            "Gave up waiting for job"
        );
        Err(PollError::JobTimeout {
            job: job.clone(),
            attempts: schedule.max_attempts,
        })
    }
}
