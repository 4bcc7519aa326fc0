#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dm_dns::{DnsLookup, DnsValidator, LookupError};
use dm_legacy::{AlbProxy, Certificate, Route, RouteOrigin, RouteState, SqliteRouteStore};
use dm_migrator::cdn::{
    CacheBehavior, CookiePreference, CustomErrorResponse, CustomOriginConfig, DistributionConfig,
    ForwardedValues, Items, Origin, ViewerCertificate,
};
use dm_migrator::{
    CdnProvider, CertificatePage, CertificateStore, Collaborators, Distribution, LogAlerter,
    Migrator, MigratorSettings, ServerCertificateMetadata,
};
use dm_platform::{
    CreateInstance, ImmediateSleeper, InstanceInfo, JobHandle, JobState, JobStatus, PlatformApi,
    PlatformError, PlatformResult, PollSchedule, UpdateInstance,
};
use serde_json::{Value, json};

pub const ROOT_DOMAIN: &str = "domains.cloud.test";
pub const MIGRATION_PLAN: &str = "migration-plan-guid";
pub const CDN_PLAN: &str = "cdn-plan-guid";
pub const DOMAIN_PLAN: &str = "domain-plan-guid";
pub const HOSTED_ZONE: &str = "Z2FDTNDATAQYW2";
pub const SPACE: &str = "my-space-guid";
pub const ORG: &str = "my-org-guid";

// ── Platform ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetInstance(String),
    GetSpaceOrg(String),
    EnablePlan(String, String),
    DisablePlan(String, String),
    Create(CreateInstance),
    Update(String, UpdateInstance),
    Purge(String),
    GetJob(String),
}

/// In-memory broker. Jobs follow a script: each fetch pops the next status
/// and the last one repeats.
#[derive(Default)]
pub struct FakePlatform {
    pub fail_plan_update: bool,
    pub purge_leaves_instance: bool,
    pub create_never_completes: bool,
    pub rename_is_async: bool,
    calls: Mutex<Vec<Call>>,
    instances: Mutex<HashMap<String, InstanceInfo>>,
    orgs: Mutex<HashMap<String, String>>,
    visible: Mutex<HashSet<(String, String)>>,
    jobs: Mutex<HashMap<String, VecDeque<JobStatus>>>,
    counter: Mutex<u32>,
}

fn status(state: &str, payload: Value) -> JobStatus {
    JobStatus {
        state: JobState::from_platform(state),
        payload,
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        platform.orgs.lock().unwrap().insert(SPACE.into(), ORG.into());
        platform
    }

    pub fn add_instance(&self, guid: &str, name: &str) {
        self.instances.lock().unwrap().insert(
            guid.into(),
            InstanceInfo {
                guid: guid.into(),
                name: name.into(),
                space_guid: SPACE.into(),
            },
        );
    }

    pub fn grant_visibility(&self, plan: &str, org: &str) {
        self.visible.lock().unwrap().insert((plan.into(), org.into()));
    }

    pub fn is_visible(&self, plan: &str, org: &str) -> bool {
        self.visible.lock().unwrap().contains(&(plan.into(), org.into()))
    }

    pub fn instance(&self, guid: &str) -> Option<InstanceInfo> {
        self.instances.lock().unwrap().get(guid).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    pub fn purges(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Purge(_))).count()
    }

    pub fn updates(&self) -> Vec<(String, UpdateInstance)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update(id, u) => Some((id, u)),
                _ => None,
            })
            .collect()
    }

    pub fn plan_update_params(&self) -> Option<Value> {
        self.updates()
            .into_iter()
            .find(|(_, u)| u.plan_guid.is_some())
            .and_then(|(_, u)| u.parameters)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> u32 {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        *counter
    }

    fn script(&self, job: &str, statuses: Vec<JobStatus>) -> JobHandle {
        self.jobs.lock().unwrap().insert(job.into(), statuses.into());
        JobHandle::new(job)
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn get_instance(&self, instance_id: &str) -> PlatformResult<InstanceInfo> {
        self.record(Call::GetInstance(instance_id.into()));
        self.instance(instance_id)
            .ok_or_else(|| PlatformError::NotFound(format!("service instance {instance_id}")))
    }

    async fn get_space_org(&self, space_id: &str) -> PlatformResult<String> {
        self.record(Call::GetSpaceOrg(space_id.into()));
        self.orgs
            .lock()
            .unwrap()
            .get(space_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("space {space_id}")))
    }

    async fn enable_plan_for_org(&self, plan_id: &str, org_id: &str) -> PlatformResult<()> {
        self.record(Call::EnablePlan(plan_id.into(), org_id.into()));
        if !self.visible.lock().unwrap().insert((plan_id.into(), org_id.into())) {
            return Err(PlatformError::AlreadyExists(format!(
                "visibility of plan {plan_id} for org {org_id}"
            )));
        }
        Ok(())
    }

    async fn disable_plan_for_org(&self, plan_id: &str, org_id: &str) -> PlatformResult<()> {
        self.record(Call::DisablePlan(plan_id.into(), org_id.into()));
        self.visible
            .lock()
            .unwrap()
            .remove(&(plan_id.to_string(), org_id.to_string()));
        Ok(())
    }

    async fn create_instance(&self, request: &CreateInstance) -> PlatformResult<JobHandle> {
        self.record(Call::Create(request.clone()));
        let n = self.next_id();
        let new_id = format!("new-instance-{n}");
        let job = format!("create-job-{n}");

        if self.create_never_completes {
            return Ok(self.script(&job, vec![status("PROCESSING", json!({}))]));
        }

        self.instances.lock().unwrap().insert(
            new_id.clone(),
            InstanceInfo {
                guid: new_id.clone(),
                name: request.name.clone(),
                space_guid: request.space_guid.clone(),
            },
        );
        Ok(self.script(
            &job,
            vec![
                status("PROCESSING", json!({ "guid": job })),
                status(
                    "COMPLETE",
                    json!({
                        "guid": job,
                        "links": {
                            "service_instances": {
                                "href": format!("https://api.cloud.test/v3/service_instances/{new_id}")
                            }
                        }
                    }),
                ),
            ],
        ))
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        request: &UpdateInstance,
    ) -> PlatformResult<Option<JobHandle>> {
        self.record(Call::Update(instance_id.into(), request.clone()));
        let job = format!("update-job-{}", self.next_id());

        if request.plan_guid.is_some() {
            let outcome = if self.fail_plan_update {
                status(
                    "FAILED",
                    json!({ "errors": [{ "title": "CF-ServiceBrokerRequestRejected",
                                         "detail": "origin is unreachable" }] }),
                )
            } else {
                status("COMPLETE", json!({ "guid": job }))
            };
            return Ok(Some(self.script(&job, vec![outcome])));
        }

        if let Some(name) = &request.name {
            if let Some(instance) = self.instances.lock().unwrap().get_mut(instance_id) {
                instance.name = name.clone();
            }
        }
        if self.rename_is_async {
            return Ok(Some(self.script(&job, vec![status("COMPLETE", json!({}))])));
        }
        Ok(None)
    }

    async fn purge_instance(&self, instance_id: &str) -> PlatformResult<Option<JobHandle>> {
        self.record(Call::Purge(instance_id.into()));
        if !self.purge_leaves_instance {
            self.instances.lock().unwrap().remove(instance_id);
        }
        Ok(None)
    }

    async fn get_job(&self, job: &JobHandle) -> PlatformResult<JobStatus> {
        self.record(Call::GetJob(job.to_string()));
        let mut jobs = self.jobs.lock().unwrap();
        let queue = jobs
            .get_mut(job.as_str())
            .ok_or_else(|| PlatformError::NotFound(format!("job {job}")))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().cloned().unwrap())
        }
    }
}

// ── CDN + certificates ──────────────────────────────────────────

#[derive(Default)]
pub struct FakeCdn {
    distributions: HashMap<String, Distribution>,
    fetches: Mutex<Vec<String>>,
}

impl FakeCdn {
    pub fn with(distribution: Distribution) -> Self {
        let mut cdn = Self::default();
        cdn.distributions.insert(distribution.id.clone(), distribution);
        cdn
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CdnProvider for FakeCdn {
    async fn get_distribution(&self, distribution_id: &str) -> anyhow::Result<Distribution> {
        self.fetches.lock().unwrap().push(distribution_id.into());
        self.distributions
            .get(distribution_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("NoSuchDistribution: {distribution_id}"))
    }
}

#[derive(Default)]
pub struct FakeCertificates {
    pub pages: Vec<CertificatePage>,
}

#[async_trait]
impl CertificateStore for FakeCertificates {
    async fn list_server_certificates(&self, marker: Option<&str>) -> anyhow::Result<CertificatePage> {
        let index = marker.map(|m| m.parse::<usize>()).transpose()?.unwrap_or(0);
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}

pub fn server_certificate(id: &str, name: &str) -> ServerCertificateMetadata {
    ServerCertificateMetadata {
        path: "/cloudfront/".into(),
        server_certificate_name: name.into(),
        server_certificate_id: id.into(),
        arn: format!("arn:aws:iam::000000000000:server-certificate/cloudfront/{name}"),
        expiration: None,
    }
}

// ── DNS ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDns {
    cnames: HashMap<String, String>,
}

impl FakeDns {
    pub fn with_valid(domains: &[&str]) -> Self {
        let mut dns = Self::default();
        for d in domains {
            dns.cnames.insert(
                format!("_acme-challenge.{d}"),
                format!("_acme-challenge.{d}.{ROOT_DOMAIN}."),
            );
            dns.cnames.insert(d.to_string(), format!("{d}.{ROOT_DOMAIN}."));
        }
        dns
    }
}

#[async_trait]
impl DnsLookup for FakeDns {
    async fn cname(&self, name: &str) -> Result<String, LookupError> {
        self.cnames.get(name).cloned().ok_or(LookupError::NxDomain)
    }

    async fn txt(&self, _name: &str) -> Result<Vec<String>, LookupError> {
        Err(LookupError::NoAnswer)
    }
}

// ── Fixtures ────────────────────────────────────────────────────

pub fn certificate() -> Certificate {
    Certificate {
        name: Some("my-cert".into()),
        iam_id: Some("ASCAEXAMPLE".into()),
        arn: Some("arn:aws:iam::000000000000:server-certificate/cloudfront/my-cert".into()),
        expires: Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
        deleted_at: None,
    }
}

pub fn cdn_route(instance_id: &str, domains: &[&str]) -> Route {
    Route {
        instance_id: instance_id.into(),
        state: RouteState::Provisioned,
        domains: domains.iter().map(|d| d.to_string()).collect(),
        certificates: vec![certificate()],
        origin: RouteOrigin::Cdn {
            dist_id: Some("sample-distribution-id".into()),
            domain_internal: Some("example.cloudfront.net".into()),
        },
    }
}

pub fn alb_route(instance_id: &str, domains: &[&str]) -> Route {
    Route {
        instance_id: instance_id.into(),
        state: RouteState::MigrationFailed,
        domains: domains.iter().map(|d| d.to_string()).collect(),
        certificates: vec![certificate()],
        origin: RouteOrigin::Alb {
            proxy: Some(AlbProxy {
                arn: "alb-arn-0".into(),
                listener_arn: "listener-arn-0".into(),
                dns_name: "alb-0.cloud.test".into(),
            }),
        },
    }
}

/// Whitelisted cookie, one forwarded header, 404 and 500 error pages.
pub fn sample_distribution() -> Distribution {
    Distribution {
        id: "sample-distribution-id".into(),
        arn: "arn:aws:cloudfront::000000000000:distribution/sample-distribution-id".into(),
        domain_name: "example.cloudfront.net".into(),
        distribution_config: DistributionConfig {
            aliases: Items::new(vec!["example.com".into(), "foo.com".into()]),
            origins: Items::new(vec![
                Origin {
                    id: "s3-cdn-broker-le-verify".into(),
                    domain_name: "cdn-broker-le-verify.s3.amazonaws.com".into(),
                    origin_path: String::new(),
                    s3_origin_config: Some(json!({ "OriginAccessIdentity": "" })),
                    custom_origin_config: None,
                },
                Origin {
                    id: "origin".into(),
                    domain_name: "origin.example.com".into(),
                    origin_path: "/origin-path".into(),
                    s3_origin_config: None,
                    custom_origin_config: Some(CustomOriginConfig {
                        http_port: Some(80),
                        https_port: Some(443),
                        origin_protocol_policy: "https-only".into(),
                    }),
                },
            ]),
            default_cache_behavior: CacheBehavior {
                forwarded_values: ForwardedValues {
                    query_string: true,
                    cookies: CookiePreference {
                        forward: "whitelist".into(),
                        whitelisted_names: Some(Items::new(vec!["white-listed-name".into()])),
                    },
                    headers: Items::new(vec!["x-my-header".into()]),
                },
            },
            custom_error_responses: Items::new(vec![
                CustomErrorResponse {
                    error_code: 404,
                    response_page_path: Some("/four-oh-four".into()),
                    response_code: Some("404".into()),
                    error_caching_min_ttl: Some(300),
                },
                CustomErrorResponse {
                    error_code: 500,
                    response_page_path: Some("/five-hundred".into()),
                    response_code: Some("500".into()),
                    error_caching_min_ttl: Some(300),
                },
            ]),
            viewer_certificate: Some(ViewerCertificate {
                iam_certificate_id: Some("ASCAEXAMPLE".into()),
                ssl_support_method: Some("sni-only".into()),
                ..Default::default()
            }),
        },
    }
}

pub fn settings() -> MigratorSettings {
    MigratorSettings {
        migration_plan_id: MIGRATION_PLAN.into(),
        cdn_plan_id: CDN_PLAN.into(),
        domain_plan_id: DOMAIN_PLAN.into(),
        hosted_zone_id: HOSTED_ZONE.into(),
        migration_instance_name: "external-domain-broker-migrator".into(),
        job_schedule: PollSchedule::new(1, 10),
        purge_schedule: PollSchedule::new(1, 5),
    }
}

pub struct Harness {
    pub migrator: Migrator,
    pub platform: Arc<FakePlatform>,
    pub store: Arc<SqliteRouteStore>,
    pub cdn: Arc<FakeCdn>,
    pub alerter: Arc<LogAlerter>,
    pub sleeper: Arc<ImmediateSleeper>,
}

pub struct HarnessBuilder {
    platform: FakePlatform,
    dns: FakeDns,
    routes: Vec<Route>,
    certificates: FakeCertificates,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            platform: FakePlatform::new(),
            dns: FakeDns::default(),
            routes: Vec::new(),
            certificates: FakeCertificates::default(),
        }
    }

    /// Seed a route, its legacy instance on the platform, and (optionally)
    /// correct DNS for all its domains.
    pub fn route(mut self, route: Route, legacy_name: &str, dns_ready: bool) -> Self {
        self.platform.add_instance(&route.instance_id, legacy_name);
        if dns_ready {
            for d in &route.domains {
                let valid = FakeDns::with_valid(&[d.as_str()]);
                self.dns.cnames.extend(valid.cnames);
            }
        }
        self.routes.push(route);
        self
    }

    pub fn platform(mut self, f: impl FnOnce(&mut FakePlatform)) -> Self {
        f(&mut self.platform);
        self
    }

    pub fn certificates(mut self, pages: Vec<CertificatePage>) -> Self {
        self.certificates.pages = pages;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(SqliteRouteStore::open_in_memory().unwrap());
        for route in &self.routes {
            store.insert_route(route).unwrap();
        }

        let platform = Arc::new(self.platform);
        let cdn = Arc::new(FakeCdn::with(sample_distribution()));
        let alerter = Arc::new(LogAlerter::new());
        let sleeper = Arc::new(ImmediateSleeper::new());

        let migrator = Migrator::new(
            Collaborators {
                platform: platform.clone(),
                sleeper: sleeper.clone(),
                store: store.clone(),
                dns: DnsValidator::new(Arc::new(self.dns), ROOT_DOMAIN),
                cdn: cdn.clone(),
                certificates: Arc::new(self.certificates),
                alerter: alerter.clone(),
            },
            settings(),
        );

        Harness {
            migrator,
            platform,
            store,
            cdn,
            alerter,
            sleeper,
        }
    }
}

impl Harness {
    pub fn route(&self, instance_id: &str) -> Route {
        use dm_legacy::RouteStore;
        self.store.find_by_instance_id(instance_id).unwrap().unwrap()
    }
}
