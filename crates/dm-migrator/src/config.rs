use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dm_dns::{DnsValidator, HickoryLookup};
use dm_legacy::SqliteRouteStore;
use dm_platform::{CfClient, PollSchedule};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default = "default_smtp_from")]
    pub from: String,

    /// Upgrade the connection with STARTTLS.
    #[serde(default)]
    pub tls: bool,

    /// Extra PEM CA trusted for the STARTTLS upgrade.
    #[serde(default)]
    pub cert: Option<String>,

    /// Login is attempted only when both user and password are set.
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            from: default_smtp_from(),
            tls: false,
            cert: None,
            user: None,
            password: None,
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".into()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_smtp_from() -> String {
    "no-reply@domains.cloud.test".into()
}

/// Per-field overrides of the environment's polling defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollOverrides {
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub purge_max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigratorConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Zone customer CNAMEs must point into, e.g. `domains.cloud.test`.
    #[serde(default = "default_dns_root_domain")]
    pub dns_root_domain: String,

    /// `host:port` of the resolver used for every DNS check.
    #[serde(default = "default_dns_verification_server")]
    pub dns_verification_server: String,

    #[serde(default = "default_dns_timeout_secs")]
    pub dns_timeout_secs: u64,

    /// TXT value that flags a domain as ready.
    #[serde(default)]
    pub semaphore: String,

    #[serde(default)]
    pub migration_plan_id: String,

    #[serde(default)]
    pub cdn_plan_id: String,

    #[serde(default)]
    pub domain_plan_id: String,

    #[serde(default)]
    pub alb_hosted_zone_id: String,

    /// Name of the placeholder instance before it takes over the legacy name.
    #[serde(default = "default_migration_instance_name")]
    pub migration_instance_name: String,

    #[serde(default)]
    pub cf_api_endpoint: String,

    #[serde(default)]
    pub cf_api_token: String,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Operator address for failure alerts and run reports.
    #[serde(default)]
    pub alert_email: String,

    #[serde(default)]
    pub poll: PollOverrides,
}

fn default_dns_root_domain() -> String {
    "domains.cloud.test".into()
}

fn default_dns_verification_server() -> String {
    "127.0.0.1:53".into()
}

fn default_dns_timeout_secs() -> u64 {
    5
}

fn default_migration_instance_name() -> String {
    "external-domain-broker-migrator".into()
}

fn default_database_path() -> String {
    "/var/lib/domain-migrator/legacy.db".into()
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            dns_root_domain: default_dns_root_domain(),
            dns_verification_server: default_dns_verification_server(),
            dns_timeout_secs: default_dns_timeout_secs(),
            semaphore: String::new(),
            migration_plan_id: String::new(),
            cdn_plan_id: String::new(),
            domain_plan_id: String::new(),
            alb_hosted_zone_id: String::new(),
            migration_instance_name: default_migration_instance_name(),
            cf_api_endpoint: String::new(),
            cf_api_token: String::new(),
            database_path: default_database_path(),
            smtp: SmtpConfig::default(),
            alert_email: String::new(),
            poll: PollOverrides::default(),
        }
    }
}

impl MigratorConfig {
    pub const DEFAULT_PATH: &'static str = "/etc/domain-migrator/config.json";
    pub const PATH_ENV: &'static str = "MIGRATOR_CONFIG_PATH";

    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load from `$MIGRATOR_CONFIG_PATH`, or the default path.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(Self::PATH_ENV).unwrap_or_else(|_| Self::DEFAULT_PATH.to_string());
        Self::load_from_file(path)
    }

    /// Schedule for create/update/rename jobs.
    pub fn job_schedule(&self) -> PollSchedule {
        let (interval, attempts) = if self.environment.is_production() {
            (30, 60)
        } else {
            (1, 10)
        };
        PollSchedule::new(
            self.poll.interval_secs.unwrap_or(interval),
            self.poll.max_attempts.unwrap_or(attempts),
        )
    }

    /// Schedule for confirming a purged instance is gone.
    pub fn purge_schedule(&self) -> PollSchedule {
        let (interval, attempts) = if self.environment.is_production() {
            (30, 10)
        } else {
            (1, 5)
        };
        PollSchedule::new(
            self.poll.interval_secs.unwrap_or(interval),
            self.poll.purge_max_attempts.unwrap_or(attempts),
        )
    }

    pub fn alerts_enabled(&self) -> bool {
        self.environment != Environment::Local
    }

    pub fn dns_validator(&self) -> anyhow::Result<DnsValidator> {
        let lookup = HickoryLookup::from_server_str(
            &self.dns_verification_server,
            Duration::from_secs(self.dns_timeout_secs),
        )
        .with_context(|| {
            format!(
                "Invalid dns_verification_server: {}",
                self.dns_verification_server
            )
        })?;
        let validator = DnsValidator::new(Arc::new(lookup), &self.dns_root_domain);
        if self.semaphore.is_empty() {
            Ok(validator)
        } else {
            Ok(validator.with_semaphore(&self.semaphore))
        }
    }

    pub fn platform_client(&self) -> anyhow::Result<CfClient> {
        if self.cf_api_endpoint.is_empty() {
            anyhow::bail!("cf_api_endpoint is not configured");
        }
        Ok(CfClient::new(&self.cf_api_endpoint, &self.cf_api_token))
    }

    pub fn route_store(&self) -> anyhow::Result<SqliteRouteStore> {
        SqliteRouteStore::open(&self.database_path)
            .with_context(|| format!("Failed to open route store: {}", self.database_path))
    }
}
