//! Migration of legacy CDN and ALB domain routes onto the unified broker.
//!
//! [`Migrator`] drives one route at a time: resolve its org, create a
//! placeholder instance on the migration plan, move it to the target plan
//! with the legacy configuration, purge the legacy instance, and hand the
//! new instance the legacy name.

pub mod alert;
pub mod cdn;
pub mod certs;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod logging;
pub mod migration;

pub use alert::{Alerter, LogAlerter, SentAlert, SmtpAlerter, alerter_for};
pub use cdn::{CdnProvider, Distribution};
pub use certs::{CertificatePage, CertificateStore, ServerCertificateMetadata};
pub use config::{Environment, MigratorConfig};
pub use context::MigrationContext;
pub use error::{MigrationError, MigrationResult};
pub use extract::{CertificateIdentity, ExtractError, MigrationParams, MigrationPlan};
pub use migration::{
    Collaborators, DnsGate, MigrationOutcome, MigrationSummary, Migrator, MigratorSettings,
};
