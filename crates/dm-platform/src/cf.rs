//! Cloud Foundry v3 implementation of [`PlatformApi`].
//! Authentication is a pre-issued bearer token; token exchange happens
//! outside this crate.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::api::PlatformApi;
use crate::types::{
    CreateInstance, InstanceInfo, JobHandle, JobState, JobStatus, PlatformError, PlatformResult,
    UpdateInstance, error_details,
};

pub struct CfClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl CfClient {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Send with auth and turn any non-2xx status into a [`PlatformError`].
    async fn send(&self, request: RequestBuilder, what: &str) -> PlatformResult<Response> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body, what))
    }

    async fn get_json(&self, path: &str, what: &str) -> PlatformResult<Value> {
        let resp = self.send(self.http.get(self.url(path)), what).await?;
        Ok(resp.json().await?)
    }

    fn update_request(&self, instance_id: &str, request: &UpdateInstance) -> RequestBuilder {
        let mut body = json!({});
        if let Some(name) = &request.name {
            body["name"] = json!(name);
        }
        if let Some(plan) = &request.plan_guid {
            body["relationships"] = json!({ "service_plan": { "data": { "guid": plan } } });
        }
        if let Some(parameters) = &request.parameters {
            body["parameters"] = parameters.clone();
        }
        self.http
            .patch(self.url(&format!("/v3/service_instances/{instance_id}")))
            .json(&body)
    }

    fn purge_request(&self, instance_id: &str) -> RequestBuilder {
        self.http.delete(self.url(&format!(
            "/v3/service_instances/{instance_id}?purge=true"
        )))
    }
}

#[async_trait]
impl PlatformApi for CfClient {
    async fn get_instance(&self, instance_id: &str) -> PlatformResult<InstanceInfo> {
        let what = format!("service instance {instance_id}");
        let body = self
            .get_json(&format!("/v3/service_instances/{instance_id}"), &what)
            .await?;

        let name = str_at(&body, &["name"])
            .ok_or_else(|| PlatformError::InvalidResponse(format!("{what} has no name")))?;
        let space_guid = str_at(&body, &["relationships", "space", "data", "guid"])
            .ok_or_else(|| PlatformError::InvalidResponse(format!("{what} has no space")))?;

        Ok(InstanceInfo {
            guid: instance_id.to_string(),
            name,
            space_guid,
        })
    }

    async fn get_space_org(&self, space_id: &str) -> PlatformResult<String> {
        let what = format!("space {space_id}");
        let body = self.get_json(&format!("/v3/spaces/{space_id}"), &what).await?;
        str_at(&body, &["relationships", "organization", "data", "guid"])
            .ok_or_else(|| PlatformError::InvalidResponse(format!("{what} has no organization")))
    }

    async fn enable_plan_for_org(&self, plan_id: &str, org_id: &str) -> PlatformResult<()> {
        let request = self
            .http
            .post(self.url(&format!("/v3/service_plans/{plan_id}/visibility")))
            .json(&json!({
                "type": "organization",
                "organizations": [{ "guid": org_id }]
            }));
        self.send(request, &format!("visibility of plan {plan_id} for org {org_id}"))
            .await?;
        info!(plan = plan_id, org = org_id, "Enabled service plan for org");
        Ok(())
    }

    async fn disable_plan_for_org(&self, plan_id: &str, org_id: &str) -> PlatformResult<()> {
        let request = self.http.delete(self.url(&format!(
            "/v3/service_plans/{plan_id}/visibility/{org_id}"
        )));
        self.send(request, &format!("visibility of plan {plan_id} for org {org_id}"))
            .await?;
        info!(plan = plan_id, org = org_id, "Disabled service plan for org");
        Ok(())
    }

    async fn create_instance(&self, request: &CreateInstance) -> PlatformResult<JobHandle> {
        let body = json!({
            "type": "managed",
            "name": request.name,
            "parameters": request.parameters,
            "relationships": {
                "space": { "data": { "guid": request.space_guid } },
                "service_plan": { "data": { "guid": request.plan_guid } }
            }
        });
        let resp = self
            .send(
                self.http.post(self.url("/v3/service_instances")).json(&body),
                &format!("service instance {}", request.name),
            )
            .await?;

        job_from_headers(resp.headers()).ok_or_else(|| {
            PlatformError::InvalidResponse("instance create returned no job location".to_string())
        })
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        request: &UpdateInstance,
    ) -> PlatformResult<Option<JobHandle>> {
        let resp = self
            .send(
                self.update_request(instance_id, request),
                &format!("service instance {instance_id}"),
            )
            .await?;
        Ok(async_job(resp.status(), resp.headers()))
    }

    async fn purge_instance(&self, instance_id: &str) -> PlatformResult<Option<JobHandle>> {
        let resp = self
            .send(
                self.purge_request(instance_id),
                &format!("service instance {instance_id}"),
            )
            .await?;
        info!(instance_id, "Purge request accepted");
        Ok(async_job(resp.status(), resp.headers()))
    }

    async fn get_job(&self, job: &JobHandle) -> PlatformResult<JobStatus> {
        let payload = self
            .get_json(&format!("/v3/jobs/{job}"), &format!("job {job}"))
            .await?;
        let state = str_at(&payload, &["state"])
            .map(|s| JobState::from_platform(&s))
            .ok_or_else(|| PlatformError::InvalidResponse(format!("job {job} has no state")))?;
        debug!(job = %job, ?state, "Fetched job");
        Ok(JobStatus { state, payload })
    }
}

fn job_from_headers(headers: &HeaderMap) -> Option<JobHandle> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(JobHandle::from_location)
}

/// `202 Accepted` carries a job; any other success completed synchronously.
fn async_job(status: StatusCode, headers: &HeaderMap) -> Option<JobHandle> {
    if status == StatusCode::ACCEPTED {
        job_from_headers(headers)
    } else {
        None
    }
}

fn str_at(body: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(body, |node, key| node.get(*key))
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn classify_error(status: u16, body: &str, what: &str) -> PlatformError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| error_details(&v))
        .unwrap_or_else(|| body.to_string());

    if status == 404 {
        return PlatformError::NotFound(what.to_string());
    }
    if (status == 409 || status == 422) && message.to_ascii_lowercase().contains("already exists") {
        return PlatformError::AlreadyExists(what.to_string());
    }
    PlatformError::Api { status, message }
}
