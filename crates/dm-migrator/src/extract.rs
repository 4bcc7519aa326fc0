//! Turns already-fetched legacy data into the parameter documents the new
//! broker accepts. Nothing here performs I/O.

use std::collections::BTreeMap;

use dm_legacy::{Certificate, Route, RouteKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cdn::{CustomErrorResponse, Distribution, Items, Origin};
use crate::certs::ServerCertificateMetadata;
use crate::context::MigrationContext;
use crate::migration::MigratorSettings;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("route {0} has no distribution to read")]
    MissingDistribution(String),

    #[error("distribution {0} has no origin besides the challenge bucket")]
    NoOrigin(String),

    #[error("origin {0} has no custom origin config")]
    MissingOriginConfig(String),

    #[error("unknown cookie forwarding policy: {0}")]
    UnknownCookiePolicy(String),

    #[error("route {0} has no ALB proxy")]
    MissingAlbProxy(String),

    #[error("route {0} has no usable certificate")]
    NoCertificate(String),

    #[error("{plan} plan cannot migrate {kind} route {instance_id}")]
    KindMismatch {
        plan: &'static str,
        kind: &'static str,
        instance_id: String,
    },

    #[error("failed to encode parameters: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardCookiePolicy {
    All,
    None,
    Whitelist,
}

impl ForwardCookiePolicy {
    pub fn parse(s: &str) -> ExtractResult<Self> {
        match s {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            "whitelist" => Ok(Self::Whitelist),
            other => Err(ExtractError::UnknownCookiePolicy(other.to_string())),
        }
    }
}

/// Which uploaded server certificate the new instance keeps serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateIdentity {
    #[serde(rename = "iam_server_certificate_name")]
    pub name: String,
    #[serde(rename = "iam_server_certificate_id")]
    pub id: String,
    #[serde(rename = "iam_server_certificate_arn")]
    pub arn: String,
}

impl CertificateIdentity {
    /// Only complete records qualify.
    pub fn from_certificate(cert: &Certificate) -> Option<Self> {
        Some(Self {
            name: cert.name.clone()?,
            id: cert.iam_id.clone()?,
            arn: cert.arn.clone()?,
        })
    }
}

impl From<&ServerCertificateMetadata> for CertificateIdentity {
    fn from(meta: &ServerCertificateMetadata) -> Self {
        Self {
            name: meta.server_certificate_name.clone(),
            id: meta.server_certificate_id.clone(),
            arn: meta.arn.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdnParams {
    pub origin: String,
    pub path: String,
    pub insecure_origin: bool,
    #[serde(skip)]
    pub origin_protocol_policy: String,
    pub forward_cookie_policy: ForwardCookiePolicy,
    pub forwarded_cookies: Vec<String>,
    pub forwarded_headers: Vec<String>,
    pub error_responses: BTreeMap<String, String>,
    pub cloudfront_distribution_id: String,
    pub cloudfront_distribution_arn: String,
    #[serde(flatten)]
    pub certificate: CertificateIdentity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainParams {
    /// DNS name of the ALB.
    pub domain_internal: String,
    pub alb_arn: String,
    pub alb_listener_arn: String,
    pub hosted_zone_id: String,
    #[serde(flatten)]
    pub certificate: CertificateIdentity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationParams {
    Cdn(CdnParams),
    Domain(DomainParams),
}

impl MigrationParams {
    pub fn to_value(&self) -> ExtractResult<Value> {
        Ok(match self {
            Self::Cdn(p) => serde_json::to_value(p)?,
            Self::Domain(p) => serde_json::to_value(p)?,
        })
    }
}

/// Where a route is headed and how its configuration is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPlan {
    Cdn { plan_id: String },
    Domain { plan_id: String, hosted_zone_id: String },
}

impl MigrationPlan {
    pub fn for_route(route: &Route, settings: &MigratorSettings) -> Self {
        match route.kind() {
            RouteKind::Cdn => Self::Cdn {
                plan_id: settings.cdn_plan_id.clone(),
            },
            RouteKind::Domain => Self::Domain {
                plan_id: settings.domain_plan_id.clone(),
                hosted_zone_id: settings.hosted_zone_id.clone(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cdn { .. } => "cdn",
            Self::Domain { .. } => "domain",
        }
    }

    pub fn target_plan_id(&self) -> &str {
        match self {
            Self::Cdn { plan_id } | Self::Domain { plan_id, .. } => plan_id,
        }
    }

    /// Build update parameters from the route and whatever `ctx` has
    /// already fetched for it.
    pub fn extract_config(&self, route: &Route, ctx: &MigrationContext) -> ExtractResult<MigrationParams> {
        match (self, route.kind()) {
            (Self::Cdn { .. }, RouteKind::Cdn) => {
                let distribution = ctx
                    .distribution
                    .as_ref()
                    .ok_or_else(|| ExtractError::MissingDistribution(route.instance_id.clone()))?;
                Ok(MigrationParams::Cdn(extract_cdn_params(
                    route,
                    distribution,
                    ctx.fallback_certificate.as_ref(),
                )?))
            }
            (Self::Domain { hosted_zone_id, .. }, RouteKind::Domain) => Ok(MigrationParams::Domain(
                extract_domain_params(route, hosted_zone_id)?,
            )),
            (plan, kind) => Err(ExtractError::KindMismatch {
                plan: plan.name(),
                kind: kind.as_str(),
                instance_id: route.instance_id.clone(),
            }),
        }
    }
}

/// The route's current certificate, else `fallback`.
pub fn resolve_certificate(
    route: &Route,
    fallback: Option<&CertificateIdentity>,
) -> ExtractResult<CertificateIdentity> {
    route
        .current_certificate()
        .and_then(CertificateIdentity::from_certificate)
        .or_else(|| fallback.cloned())
        .ok_or_else(|| ExtractError::NoCertificate(route.instance_id.clone()))
}

/// The one origin that is not the challenge bucket.
pub fn select_origin(distribution: &Distribution) -> ExtractResult<&Origin> {
    distribution
        .distribution_config
        .origins
        .items
        .iter()
        .find(|o| o.s3_origin_config.is_none())
        .ok_or_else(|| ExtractError::NoOrigin(distribution.id.clone()))
}

/// Status code → page path. The declared response code wins over the error
/// code; entries without a page are dropped.
pub fn parse_error_responses(responses: &Items<CustomErrorResponse>) -> BTreeMap<String, String> {
    responses
        .items
        .iter()
        .filter_map(|r| {
            let page = r.response_page_path.as_deref().filter(|p| !p.is_empty())?;
            let code = r
                .response_code
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| r.error_code.to_string());
            Some((code, page.to_string()))
        })
        .collect()
}

pub fn extract_cdn_params(
    route: &Route,
    distribution: &Distribution,
    fallback_certificate: Option<&CertificateIdentity>,
) -> ExtractResult<CdnParams> {
    let config = &distribution.distribution_config;
    let origin = select_origin(distribution)?;
    let policy = origin
        .custom_origin_config
        .as_ref()
        .map(|c| c.origin_protocol_policy.clone())
        .ok_or_else(|| ExtractError::MissingOriginConfig(origin.id.clone()))?;

    let cookies = &config.default_cache_behavior.forwarded_values.cookies;
    let forward_cookie_policy = ForwardCookiePolicy::parse(&cookies.forward)?;
    let forwarded_cookies = match forward_cookie_policy {
        ForwardCookiePolicy::Whitelist => cookies
            .whitelisted_names
            .as_ref()
            .map(|n| n.items.clone())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    Ok(CdnParams {
        origin: origin.domain_name.clone(),
        path: origin.origin_path.clone(),
        insecure_origin: policy == "http-only",
        origin_protocol_policy: policy,
        forward_cookie_policy,
        forwarded_cookies,
        forwarded_headers: config.default_cache_behavior.forwarded_values.headers.items.clone(),
        error_responses: parse_error_responses(&config.custom_error_responses),
        cloudfront_distribution_id: distribution.id.clone(),
        cloudfront_distribution_arn: distribution.arn.clone(),
        certificate: resolve_certificate(route, fallback_certificate)?,
    })
}

pub fn extract_domain_params(route: &Route, hosted_zone_id: &str) -> ExtractResult<DomainParams> {
    let proxy = route
        .alb_proxy()
        .ok_or_else(|| ExtractError::MissingAlbProxy(route.instance_id.clone()))?;

    Ok(DomainParams {
        domain_internal: proxy.dns_name.clone(),
        alb_arn: proxy.arn.clone(),
        alb_listener_arn: proxy.listener_arn.clone(),
        hosted_zone_id: hosted_zone_id.to_string(),
        certificate: resolve_certificate(route, None)?,
    })
}
