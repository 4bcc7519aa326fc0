//! CloudFront distribution documents, in the provider's own PascalCase
//! shape, and the seam used to fetch them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fetches distribution configuration from the CDN provider.
#[async_trait]
pub trait CdnProvider: Send + Sync {
    async fn get_distribution(&self, distribution_id: &str) -> anyhow::Result<Distribution>;
}

/// CloudFront's `{Quantity, Items}` list wrapper. `Items` is omitted by the
/// provider when the list is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Items<T> {
    #[serde(default)]
    pub quantity: u32,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for Items<T> {
    fn default() -> Self {
        Self {
            quantity: 0,
            items: Vec::new(),
        }
    }
}

impl<T> Items<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            quantity: items.len() as u32,
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Distribution {
    pub id: String,
    #[serde(rename = "ARN")]
    pub arn: String,
    #[serde(default)]
    pub domain_name: String,
    pub distribution_config: DistributionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionConfig {
    #[serde(default)]
    pub aliases: Items<String>,
    pub origins: Items<Origin>,
    pub default_cache_behavior: CacheBehavior,
    #[serde(default)]
    pub custom_error_responses: Items<CustomErrorResponse>,
    #[serde(default)]
    pub viewer_certificate: Option<ViewerCertificate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    pub id: String,
    pub domain_name: String,
    #[serde(default)]
    pub origin_path: String,
    /// Present only on the bucket origin used for domain-validation challenges.
    #[serde(default, rename = "S3OriginConfig")]
    pub s3_origin_config: Option<Value>,
    #[serde(default)]
    pub custom_origin_config: Option<CustomOriginConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomOriginConfig {
    #[serde(default, rename = "HTTPPort")]
    pub http_port: Option<u16>,
    #[serde(default, rename = "HTTPSPort")]
    pub https_port: Option<u16>,
    /// `http-only`, `https-only` or `match-viewer`.
    pub origin_protocol_policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheBehavior {
    pub forwarded_values: ForwardedValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForwardedValues {
    #[serde(default)]
    pub query_string: bool,
    pub cookies: CookiePreference,
    #[serde(default)]
    pub headers: Items<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CookiePreference {
    /// `all`, `none` or `whitelist`.
    pub forward: String,
    #[serde(default)]
    pub whitelisted_names: Option<Items<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomErrorResponse {
    pub error_code: u16,
    #[serde(default)]
    pub response_page_path: Option<String>,
    #[serde(default)]
    pub response_code: Option<String>,
    #[serde(default, rename = "ErrorCachingMinTTL")]
    pub error_caching_min_ttl: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewerCertificate {
    #[serde(default, rename = "CloudFrontDefaultCertificate")]
    pub cloudfront_default_certificate: Option<bool>,
    #[serde(default, rename = "IAMCertificateId")]
    pub iam_certificate_id: Option<String>,
    #[serde(default, rename = "ACMCertificateArn")]
    pub acm_certificate_arn: Option<String>,
    #[serde(default, rename = "SSLSupportMethod")]
    pub ssl_support_method: Option<String>,
}
