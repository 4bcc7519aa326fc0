use std::sync::Arc;

use dm_dns::DnsValidator;
use dm_legacy::{CandidateSelector, Route, RouteKind, RouteState, RouteStore};
use dm_platform::{
    CreateInstance, JobPoller, PlatformApi, PlatformError, PollSchedule, Sleeper, UpdateInstance,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::alert::{Alerter, failure_body, failure_subject, report_body, report_subject};
use crate::cdn::CdnProvider;
use crate::certs::{CertificateStore, find_server_certificate};
use crate::config::MigratorConfig;
use crate::context::MigrationContext;
use crate::error::{MigrationError, MigrationResult, error_chain};
use crate::extract::{CertificateIdentity, ExtractError, MigrationPlan};

/// Plan ids, naming and polling budgets used by every migration.
#[derive(Debug, Clone)]
pub struct MigratorSettings {
    pub migration_plan_id: String,
    pub cdn_plan_id: String,
    pub domain_plan_id: String,
    pub hosted_zone_id: String,
    pub migration_instance_name: String,
    pub job_schedule: PollSchedule,
    pub purge_schedule: PollSchedule,
}

impl MigratorSettings {
    pub fn from_config(config: &MigratorConfig) -> Self {
        Self {
            migration_plan_id: config.migration_plan_id.clone(),
            cdn_plan_id: config.cdn_plan_id.clone(),
            domain_plan_id: config.domain_plan_id.clone(),
            hosted_zone_id: config.alb_hosted_zone_id.clone(),
            migration_instance_name: config.migration_instance_name.clone(),
            job_schedule: config.job_schedule(),
            purge_schedule: config.purge_schedule(),
        }
    }
}

impl Default for MigratorSettings {
    fn default() -> Self {
        Self::from_config(&MigratorConfig::default())
    }
}

/// Per-run relaxations of the DNS gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsGate {
    /// Migrate without looking at DNS at all.
    pub skip_dns_check: bool,
    /// Only require the `_acme-challenge` record.
    pub skip_site_dns_check: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated { new_instance_id: String },
    /// DNS not ready; the route was left untouched.
    Skipped,
}

/// External services the migrator talks to, built once by the caller.
pub struct Collaborators {
    pub platform: Arc<dyn PlatformApi>,
    pub sleeper: Arc<dyn Sleeper>,
    pub store: Arc<dyn RouteStore>,
    pub dns: DnsValidator,
    pub cdn: Arc<dyn CdnProvider>,
    pub certificates: Arc<dyn CertificateStore>,
    pub alerter: Arc<dyn Alerter>,
}

/// Moves legacy routes onto the new broker, one at a time.
pub struct Migrator {
    platform: Arc<dyn PlatformApi>,
    poller: JobPoller,
    sleeper: Arc<dyn Sleeper>,
    store: Arc<dyn RouteStore>,
    selector: CandidateSelector,
    dns: DnsValidator,
    cdn: Arc<dyn CdnProvider>,
    certificates: Arc<dyn CertificateStore>,
    alerter: Arc<dyn Alerter>,
    settings: MigratorSettings,
}

impl Migrator {
    pub fn new(collaborators: Collaborators, settings: MigratorSettings) -> Self {
        let Collaborators {
            platform,
            sleeper,
            store,
            dns,
            cdn,
            certificates,
            alerter,
        } = collaborators;

        Self {
            poller: JobPoller::new(platform.clone(), sleeper.clone()),
            selector: CandidateSelector::new(store.clone()),
            platform,
            sleeper,
            store,
            dns,
            cdn,
            certificates,
            alerter,
            settings,
        }
    }

    pub fn settings(&self) -> &MigratorSettings {
        &self.settings
    }

    pub async fn route_dns_ready(&self, route: &Route, gate: DnsGate) -> bool {
        if gate.skip_dns_check {
            warn!(instance_id = %route.instance_id, "Skipping DNS check");
            return true;
        }
        self.dns
            .domains_have_valid_dns(&route.domains, gate.skip_site_dns_check)
            .await
    }

    /// Migrate every eligible route whose DNS is ready. One route failing
    /// never stops the others. A report alert is sent at the end.
    pub async fn migrate_ready_instances(&self) -> MigrationResult<MigrationSummary> {
        let candidates = self.selector.find_candidates()?;
        let mut summary = MigrationSummary::default();

        for route in &candidates {
            if !self.route_dns_ready(route, DnsGate::default()).await {
                info!(instance_id = %route.instance_id, "DNS not ready, skipping");
                summary.skipped.push(route.instance_id.clone());
                continue;
            }
            match self.migrate(route).await {
                Ok(_) => summary.migrated.push(route.instance_id.clone()),
                Err(_) => summary.failed.push(route.instance_id.clone()),
            }
        }

        info!(
            migrated = summary.migrated.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Migration run finished"
        );
        if let Err(e) = self
            .alerter
            .send(&report_subject(&summary), &report_body(&summary))
            .await
        {
            warn!("Failed to send migration report: {e:#}");
        }
        Ok(summary)
    }

    pub async fn migrate_single_instance(
        &self,
        instance_id: &str,
        gate: DnsGate,
    ) -> MigrationResult<MigrationOutcome> {
        let route = self.selector.find_by_instance_id(instance_id)?;
        if !route.is_migratable() {
            return Err(MigrationError::NotEligible {
                instance_id: route.instance_id,
                state: route.state,
            });
        }
        if !self.route_dns_ready(&route, gate).await {
            info!(instance_id, "DNS not ready, skipping");
            return Ok(MigrationOutcome::Skipped);
        }
        let new_instance_id = self.migrate(&route).await?;
        Ok(MigrationOutcome::Migrated { new_instance_id })
    }

    /// Run the full migration for one route and return the new instance id.
    /// Any failure is alerted, logged and recorded as `migration_failed`
    /// before it is returned. Ineligible routes are refused untouched.
    pub async fn migrate(&self, route: &Route) -> MigrationResult<String> {
        if !route.is_migratable() {
            return Err(MigrationError::NotEligible {
                instance_id: route.instance_id.clone(),
                state: route.state.clone(),
            });
        }

        let mut ctx = MigrationContext::new(route);
        info!(
            instance_id = %route.instance_id,
            kind = route.kind().as_str(),
            domains = %route.domains.join(","),
            "Starting migration"
        );

        match self.run(route, &mut ctx).await {
            Ok(new_instance_id) => {
                info!(instance_id = %route.instance_id, new_instance_id = %new_instance_id, "Migration complete");
                Ok(new_instance_id)
            }
            Err(err) => {
                self.record_failure(route, &ctx, &err).await;
                Err(err)
            }
        }
    }

    async fn run(&self, route: &Route, ctx: &mut MigrationContext) -> MigrationResult<String> {
        let plan = MigrationPlan::for_route(route, &self.settings);

        let (legacy_name, space_id) = self.resolve_legacy_instance(ctx).await?;
        let org_id = self.resolve_org(ctx, &space_id).await?;

        self.enable_migration_plan(&org_id).await?;

        let new_instance_id = self.create_placeholder(ctx, &space_id).await?;

        self.fetch_source(route, ctx).await?;
        let params = plan.extract_config(route, ctx)?.to_value()?;

        self.update_to_target(&new_instance_id, &plan, params).await?;

        if route.kind() == RouteKind::Cdn {
            self.store.clear_distribution(&route.instance_id)?;
        }
        self.disable_migration_plan(&org_id).await;

        self.purge_legacy(&route.instance_id).await?;

        self.rename(&new_instance_id, &legacy_name).await?;

        self.store.set_state(&route.instance_id, &RouteState::Migrated)?;
        Ok(new_instance_id)
    }

    async fn record_failure(&self, route: &Route, ctx: &MigrationContext, err: &MigrationError) {
        if let Err(e) = self
            .alerter
            .send(&failure_subject(ctx), &failure_body(ctx, err))
            .await
        {
            warn!(instance_id = %route.instance_id, "Failed to send failure alert: {e:#}");
        }

        error!(
            instance_id = %route.instance_id,
            space_id = ctx.space_id.as_deref().unwrap_or("-"),
            org_id = ctx.org_id.as_deref().unwrap_or("-"),
            error = %error_chain(err),
            "Migration failed"
        );

        if let Err(e) = self
            .store
            .set_state(&route.instance_id, &RouteState::MigrationFailed)
        {
            error!(instance_id = %route.instance_id, "Failed to mark route migration_failed: {e}");
        }
    }

    /// Display name and space of the legacy instance, fetched once.
    async fn resolve_legacy_instance(
        &self,
        ctx: &mut MigrationContext,
    ) -> MigrationResult<(String, String)> {
        if let (Some(name), Some(space)) = (&ctx.legacy_name, &ctx.space_id) {
            return Ok((name.clone(), space.clone()));
        }
        let instance = self.platform.get_instance(&ctx.instance_id).await?;
        debug!(
            instance_id = %ctx.instance_id,
            name = %instance.name,
            space_id = %instance.space_guid,
            "Resolved legacy instance"
        );
        ctx.legacy_name = Some(instance.name.clone());
        ctx.space_id = Some(instance.space_guid.clone());
        Ok((instance.name, instance.space_guid))
    }

    async fn resolve_org(&self, ctx: &mut MigrationContext, space_id: &str) -> MigrationResult<String> {
        if let Some(org) = &ctx.org_id {
            return Ok(org.clone());
        }
        let org = self.platform.get_space_org(space_id).await?;
        debug!(space_id, org_id = %org, "Resolved org");
        ctx.org_id = Some(org.clone());
        Ok(org)
    }

    async fn enable_migration_plan(&self, org_id: &str) -> MigrationResult<()> {
        let plan = &self.settings.migration_plan_id;
        match self.platform.enable_plan_for_org(plan, org_id).await {
            Ok(()) => Ok(()),
            Err(PlatformError::AlreadyExists(_)) => {
                warn!(plan = %plan, org_id, "Migration plan already visible to org");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn disable_migration_plan(&self, org_id: &str) {
        let plan = &self.settings.migration_plan_id;
        if let Err(e) = self.platform.disable_plan_for_org(plan, org_id).await {
            warn!(plan = %plan, org_id, "Failed to disable migration plan: {e}");
        }
    }

    async fn create_placeholder(
        &self,
        ctx: &mut MigrationContext,
        space_id: &str,
    ) -> MigrationResult<String> {
        if let Some(id) = &ctx.new_instance_id {
            return Ok(id.clone());
        }

        let request = CreateInstance {
            name: self.settings.migration_instance_name.clone(),
            space_guid: space_id.to_string(),
            plan_guid: self.settings.migration_plan_id.clone(),
            parameters: json!({ "domains": ctx.domains }),
        };
        let job = self.platform.create_instance(&request).await?;
        let status = self.poller.wait_for(&job, self.settings.job_schedule).await?;

        let new_id = status
            .resource_guid("service_instances")
            .ok_or(MigrationError::MissingNewInstanceId(job))?;
        info!(instance_id = %ctx.instance_id, new_instance_id = %new_id, "Placeholder instance created");
        ctx.new_instance_id = Some(new_id.clone());
        Ok(new_id)
    }

    /// Load whatever the route's extractor reads that is not in the store.
    async fn fetch_source(&self, route: &Route, ctx: &mut MigrationContext) -> MigrationResult<()> {
        if route.kind() != RouteKind::Cdn {
            return Ok(());
        }

        if ctx.distribution.is_none() {
            let dist_id = route
                .dist_id()
                .ok_or_else(|| ExtractError::MissingDistribution(route.instance_id.clone()))?;
            let distribution = self
                .cdn
                .get_distribution(dist_id)
                .await
                .map_err(MigrationError::Cdn)?;
            ctx.distribution = Some(distribution);
        }

        let has_own_certificate = route
            .current_certificate()
            .and_then(CertificateIdentity::from_certificate)
            .is_some();
        if has_own_certificate || ctx.fallback_certificate.is_some() {
            return Ok(());
        }

        let iam_id = ctx
            .distribution
            .as_ref()
            .and_then(|d| d.distribution_config.viewer_certificate.as_ref())
            .and_then(|v| v.iam_certificate_id.clone());
        if let Some(iam_id) = iam_id {
            debug!(instance_id = %route.instance_id, iam_id = %iam_id, "Looking up viewer certificate");
            let found = find_server_certificate(self.certificates.as_ref(), &iam_id)
                .await
                .map_err(MigrationError::Certificates)?;
            ctx.fallback_certificate = found.as_ref().map(CertificateIdentity::from);
        }
        Ok(())
    }

    async fn update_to_target(
        &self,
        new_instance_id: &str,
        plan: &MigrationPlan,
        params: Value,
    ) -> MigrationResult<()> {
        let request = UpdateInstance::change_plan(plan.target_plan_id(), params);
        if let Some(job) = self.platform.update_instance(new_instance_id, &request).await? {
            self.poller.wait_for(&job, self.settings.job_schedule).await?;
        }
        info!(new_instance_id, plan = plan.name(), "Instance moved to target plan");
        Ok(())
    }

    /// Delete the legacy instance, then poll until it reads as not found.
    /// Only the existence check is repeated, never the delete.
    async fn purge_legacy(&self, instance_id: &str) -> MigrationResult<()> {
        if let Some(job) = self.platform.purge_instance(instance_id).await? {
            self.poller.wait_for(&job, self.settings.job_schedule).await?;
        }

        let schedule = self.settings.purge_schedule;
        for attempt in 1..=schedule.max_attempts {
            match self.platform.get_instance(instance_id).await {
                Err(PlatformError::NotFound(_)) => {
                    info!(instance_id, attempt, "Legacy instance purged");
                    return Ok(());
                }
                Ok(_) => debug!(instance_id, attempt, "Legacy instance still present"),
                Err(e) => return Err(e.into()),
            }
            if attempt < schedule.max_attempts {
                self.sleeper.sleep(schedule.interval()).await;
            }
        }

        Err(MigrationError::PurgeNotConfirmed {
            instance_id: instance_id.to_string(),
            attempts: schedule.max_attempts,
        })
    }

    async fn rename(&self, new_instance_id: &str, name: &str) -> MigrationResult<()> {
        let request = UpdateInstance::rename(name);
        if let Some(job) = self.platform.update_instance(new_instance_id, &request).await? {
            self.poller.wait_for(&job, self.settings.job_schedule).await?;
        }
        info!(new_instance_id, name, "Instance renamed");
        Ok(())
    }
}
