use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerCertificateMetadata {
    #[serde(default)]
    pub path: String,
    pub server_certificate_name: String,
    pub server_certificate_id: String,
    pub arn: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

/// One page of a server-certificate listing. `marker` continues the listing
/// when set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificatePage {
    pub certificates: Vec<ServerCertificateMetadata>,
    pub marker: Option<String>,
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn list_server_certificates(&self, marker: Option<&str>) -> anyhow::Result<CertificatePage>;
}

/// Page through the store until a certificate with `certificate_id` turns up.
pub async fn find_server_certificate(
    store: &dyn CertificateStore,
    certificate_id: &str,
) -> anyhow::Result<Option<ServerCertificateMetadata>> {
    let mut marker: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = store.list_server_certificates(marker.as_deref()).await?;
        pages += 1;

        if let Some(found) = page
            .certificates
            .into_iter()
            .find(|c| c.server_certificate_id == certificate_id)
        {
            debug!(certificate_id, pages, "Found server certificate");
            return Ok(Some(found));
        }

        match page.marker {
            Some(next) if marker.as_deref() == Some(next.as_str()) => {
                anyhow::bail!("certificate listing repeated marker {next}");
            }
            Some(next) => marker = Some(next),
            None => {
                debug!(certificate_id, pages, "Server certificate not found");
                return Ok(None);
            }
        }
    }
}
