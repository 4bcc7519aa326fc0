use async_trait::async_trait;

use crate::types::{CreateInstance, InstanceInfo, JobHandle, JobStatus, PlatformResult, UpdateInstance};

/// Service-broker operations the migrator drives.
///
/// Operations that complete asynchronously hand back a [`JobHandle`]; the
/// caller polls it with [`crate::JobPoller`]. Operations that may be either
/// synchronous or asynchronous depending on the API version return
/// `Option<JobHandle>`.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Instance metadata. A missing instance is `PlatformError::NotFound`.
    async fn get_instance(&self, instance_id: &str) -> PlatformResult<InstanceInfo>;

    /// Guid of the organization owning `space_id`.
    async fn get_space_org(&self, space_id: &str) -> PlatformResult<String>;

    /// Make `plan_id` visible to `org_id`. Reports
    /// `PlatformError::AlreadyExists` if it already is.
    async fn enable_plan_for_org(&self, plan_id: &str, org_id: &str) -> PlatformResult<()>;

    async fn disable_plan_for_org(&self, plan_id: &str, org_id: &str) -> PlatformResult<()>;

    async fn create_instance(&self, request: &CreateInstance) -> PlatformResult<JobHandle>;

    async fn update_instance(
        &self,
        instance_id: &str,
        request: &UpdateInstance,
    ) -> PlatformResult<Option<JobHandle>>;

    /// Force-delete an instance without contacting its broker.
    async fn purge_instance(&self, instance_id: &str) -> PlatformResult<Option<JobHandle>>;

    async fn get_job(&self, job: &JobHandle) -> PlatformResult<JobStatus>;
}
