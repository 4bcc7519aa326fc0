use dm_legacy::{RouteState, StoreError};
use dm_platform::{JobHandle, PlatformError, PollError};
use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("route store error: {0}")]
    Store(#[from] StoreError),

    #[error("config extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("CDN provider error: {0:#}")]
    Cdn(anyhow::Error),

    #[error("certificate store error: {0:#}")]
    Certificates(anyhow::Error),

    #[error("job {0} completed without naming the created instance")]
    MissingNewInstanceId(JobHandle),

    /// Delete was accepted but the instance never disappeared. It may be
    /// gone and slow to show it, or still there.
    #[error("instance {instance_id} still present after {attempts} purge checks")]
    PurgeNotConfirmed { instance_id: String, attempts: u32 },

    #[error("route {instance_id} is {state}, not eligible for migration")]
    NotEligible { instance_id: String, state: RouteState },
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// `err` followed by each of its sources, separated by `: `.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
