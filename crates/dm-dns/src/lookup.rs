use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::{RData, RecordType};
use thiserror::Error;
use tracing::debug;

/// The closed set of ways a single record lookup can come back empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("name does not exist (NXDOMAIN)")]
    NxDomain,

    #[error("no record of the requested type")]
    NoAnswer,

    #[error("resolver timed out")]
    Timeout,

    #[error("resolver failure: {0}")]
    Other(String),
}

pub type LookupResult<T> = Result<T, LookupError>;

/// Record lookups the DNS gate needs. Implementations must not retry;
/// the validator treats every error as "not matching".
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Target of the CNAME record at `name`, as presented by the resolver
    /// (may carry a trailing dot).
    async fn cname(&self, name: &str) -> LookupResult<String>;

    /// All TXT strings published at `name`, quotes stripped.
    async fn txt(&self, name: &str) -> LookupResult<Vec<String>>;
}

/// [`DnsLookup`] backed by hickory, pinned to a single verification server
/// with no search domains.
pub struct HickoryLookup {
    resolver: TokioAsyncResolver,
}

impl HickoryLookup {
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(&[server.ip()], server.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }

    /// Build from a `host:port` string such as `"10.0.0.2:53"`.
    pub fn from_server_str(server: &str, timeout: Duration) -> Result<Self, AddrParseError> {
        let addr: SocketAddr = server.parse()?;
        Ok(Self::new(addr, timeout))
    }
}

#[async_trait]
impl DnsLookup for HickoryLookup {
    async fn cname(&self, name: &str) -> LookupResult<String> {
        let lookup = self
            .resolver
            .lookup(fqdn(name), RecordType::CNAME)
            .await
            .map_err(classify)?;

        lookup
            .iter()
            .find_map(|rdata| match rdata {
                RData::CNAME(cname) => Some(cname.0.to_utf8()),
                _ => None,
            })
            .ok_or(LookupError::NoAnswer)
    }

    async fn txt(&self, name: &str) -> LookupResult<Vec<String>> {
        let lookup = self
            .resolver
            .lookup(fqdn(name), RecordType::TXT)
            .await
            .map_err(classify)?;

        let values: Vec<String> = lookup
            .iter()
            .filter_map(|rdata| match rdata {
                RData::TXT(txt) => Some(
                    txt.txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                        .collect::<String>(),
                ),
                _ => None,
            })
            .map(|value| value.trim_matches('"').to_string())
            .collect();

        if values.is_empty() {
            return Err(LookupError::NoAnswer);
        }
        Ok(values)
    }
}

fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

fn classify(err: ResolveError) -> LookupError {
    debug!("resolver error: {err}");
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            LookupError::NxDomain
        }
        ResolveErrorKind::NoRecordsFound { .. } => LookupError::NoAnswer,
        ResolveErrorKind::Timeout => LookupError::Timeout,
        _ => LookupError::Other(err.to_string()),
    }
}
