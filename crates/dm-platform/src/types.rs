use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Handle to an asynchronous platform operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the job id from a `Location` header such as
    /// `https://api.example.com/v3/jobs/abc-123`.
    pub fn from_location(location: &str) -> Option<Self> {
        let id = last_path_segment(location)?;
        Some(Self::new(id))
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a job stands, normalized across API versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Map a platform state string onto the three outcomes. Accepts both the
    /// v3 job vocabulary and the v2 `last_operation` vocabulary; anything
    /// unrecognised is treated as still running.
    pub fn from_platform(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "complete" | "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One observation of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    /// Raw job document as returned by the platform.
    pub payload: Value,
}

impl JobStatus {
    /// Guid of the resource a job acted on, read from
    /// `links.<resource>.href`, or from `resource.guid` / `metadata.guid`
    /// on payloads that embed the resource itself. A top-level `guid` is
    /// the job's own id and is ignored.
    pub fn resource_guid(&self, resource: &str) -> Option<String> {
        let from_link = self
            .payload
            .get("links")
            .and_then(|l| l.get(resource))
            .and_then(|r| r.get("href"))
            .and_then(|h| h.as_str())
            .and_then(last_path_segment);
        if from_link.is_some() {
            return from_link;
        }

        self.payload
            .get("resource")
            .and_then(|r| r.get("guid"))
            .or_else(|| self.payload.get("metadata").and_then(|m| m.get("guid")))
            .and_then(|g| g.as_str())
            .map(String::from)
    }

    /// Human-readable failure detail from the `errors[]` envelope.
    pub fn failure_detail(&self) -> String {
        error_details(&self.payload).unwrap_or_else(|| self.payload.to_string())
    }
}

/// Metadata of an existing service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub guid: String,
    pub name: String,
    pub space_guid: String,
}

/// Request to provision a managed instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateInstance {
    pub name: String,
    pub space_guid: String,
    pub plan_guid: String,
    pub parameters: Value,
}

/// Partial update of a managed instance; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateInstance {
    pub name: Option<String>,
    pub plan_guid: Option<String>,
    pub parameters: Option<Value>,
}

impl UpdateInstance {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn change_plan(plan_guid: impl Into<String>, parameters: Value) -> Self {
        Self {
            plan_guid: Some(plan_guid.into()),
            parameters: Some(parameters),
            ..Default::default()
        }
    }
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("platform API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid platform response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

pub(crate) fn last_path_segment(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Join the `detail` (or `title`) of every entry in an `errors[]` envelope.
pub(crate) fn error_details(body: &Value) -> Option<String> {
    let errors = body.get("errors")?.as_array()?;
    let joined = errors
        .iter()
        .filter_map(|e| {
            e.get("detail")
                .or_else(|| e.get("title"))
                .and_then(|m| m.as_str())
        })
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() { None } else { Some(joined) }
}
