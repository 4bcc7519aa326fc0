//! Platform service-broker API: the capabilities the migrator consumes,
//! a Cloud Foundry v3 client, and bounded job polling.

pub mod api;
pub mod cf;
pub mod poller;
pub mod types;

pub use api::PlatformApi;
pub use cf::CfClient;
pub use poller::{
    ImmediateSleeper, JobPoller, PollError, PollResult, PollSchedule, Sleeper, TokioSleeper,
};
pub use types::{
    CreateInstance, InstanceInfo, JobHandle, JobState, JobStatus, PlatformError, PlatformResult,
    UpdateInstance,
};
