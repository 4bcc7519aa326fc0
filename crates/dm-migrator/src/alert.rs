use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Certificate, Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::{MigratorConfig, SmtpConfig};
use crate::context::MigrationContext;
use crate::error::{MigrationError, error_chain};
use crate::migration::MigrationSummary;

/// Delivers operator notifications.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send(&self, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

pub struct SmtpAlerter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpAlerter {
    pub fn from_config(smtp: &SmtpConfig, to: &str) -> anyhow::Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host).port(smtp.port);
        if smtp.tls {
            builder = builder.tls(Tls::Required(starttls_parameters(smtp)?));
        }
        if let (Some(user), Some(password)) = (&smtp.user, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: smtp
                .from
                .parse()
                .with_context(|| format!("Invalid SMTP from address: {}", smtp.from))?,
            to: to
                .parse()
                .with_context(|| format!("Invalid alert address: {to}"))?,
        })
    }
}

/// STARTTLS settings for the relay, trusting `smtp.cert` on top of the
/// default roots when set.
fn starttls_parameters(smtp: &SmtpConfig) -> anyhow::Result<TlsParameters> {
    let mut tls = TlsParameters::builder(smtp.host.clone());
    if let Some(pem) = &smtp.cert {
        let ca = Certificate::from_pem(pem.as_bytes()).context("Invalid SMTP CA certificate")?;
        tls = tls.add_root_certificate(ca);
    }
    tls.build()
        .with_context(|| format!("Invalid SMTP relay: {}", smtp.host))
}

#[async_trait]
impl Alerter for SmtpAlerter {
    async fn send(&self, subject: &str, html_body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .context("Failed to build alert email")?;
        self.transport
            .send(message)
            .await
            .context("Failed to send alert email")?;
        info!(to = %self.to, subject, "Alert email sent");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub subject: String,
    pub body: String,
}

/// Logs alerts and keeps them in memory instead of mailing them.
#[derive(Default)]
pub struct LogAlerter {
    sent: Mutex<Vec<SentAlert>>,
}

impl LogAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Alerter for LogAlerter {
    async fn send(&self, subject: &str, html_body: &str) -> anyhow::Result<()> {
        info!(subject, "Alert suppressed");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentAlert {
                subject: subject.to_string(),
                body: html_body.to_string(),
            });
        }
        Ok(())
    }
}

/// SMTP outside `local`, log-only otherwise.
pub fn alerter_for(config: &MigratorConfig) -> anyhow::Result<Arc<dyn Alerter>> {
    if config.alerts_enabled() {
        Ok(Arc::new(SmtpAlerter::from_config(&config.smtp, &config.alert_email)?))
    } else {
        Ok(Arc::new(LogAlerter::new()))
    }
}

pub fn failure_subject(ctx: &MigrationContext) -> String {
    format!("Migration failed for instance {}", ctx.instance_id)
}

pub fn failure_body(ctx: &MigrationContext, err: &MigrationError) -> String {
    let rows: String = ctx
        .triage_fields()
        .into_iter()
        .map(|(label, value)| format!("<tr><th>{label}</th><td>{}</td></tr>", escape_html(&value)))
        .collect();
    format!(
        "<p>Migration of a legacy service instance failed and the route was marked \
         migration_failed.</p><table>{rows}</table><p>Error:</p><pre>{}</pre>",
        escape_html(&error_chain(err))
    )
}

pub fn report_subject(summary: &MigrationSummary) -> String {
    format!(
        "Migration report: {} migrated, {} skipped, {} failed",
        summary.migrated.len(),
        summary.skipped.len(),
        summary.failed.len()
    )
}

pub fn report_body(summary: &MigrationSummary) -> String {
    let section = |title: &str, ids: &[String]| {
        let items: String = ids
            .iter()
            .map(|id| format!("<li>{}</li>", escape_html(id)))
            .collect();
        format!("<h3>{title} ({})</h3><ul>{items}</ul>", ids.len())
    };
    [
        section("Migrated", &summary.migrated),
        section("Skipped (DNS not ready)", &summary.skipped),
        section("Failed", &summary.failed),
    ]
    .concat()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
