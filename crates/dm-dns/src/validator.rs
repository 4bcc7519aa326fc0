use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::lookup::{DnsLookup, LookupError};

/// Checks that customer domains already delegate to the platform:
///
/// - `_acme-challenge.<d>` CNAME → `_acme-challenge.<d>.<root>`
/// - `<d>` CNAME → `<d>.<root>` (the "site" record, skippable)
///
/// Resolver failures never escape; they count as a mismatch.
pub struct DnsValidator {
    lookup: Arc<dyn DnsLookup>,
    root_domain: String,
    semaphore: Option<String>,
}

impl DnsValidator {
    pub fn new(lookup: Arc<dyn DnsLookup>, root_domain: &str) -> Self {
        Self {
            lookup,
            root_domain: root_domain.trim_end_matches('.').to_string(),
            semaphore: None,
        }
    }

    /// TXT value that flags a domain as ready for cutover.
    pub fn with_semaphore(mut self, semaphore: &str) -> Self {
        self.semaphore = Some(semaphore.to_string());
        self
    }

    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    pub fn semaphore(&self) -> Option<&str> {
        self.semaphore.as_deref()
    }

    pub fn acme_challenge_cname_name(domain: &str) -> String {
        format!("_acme-challenge.{domain}")
    }

    pub fn acme_challenge_cname_target(&self, domain: &str) -> String {
        format!("_acme-challenge.{domain}.{}", self.root_domain)
    }

    pub fn site_cname_target(&self, domain: &str) -> String {
        format!("{domain}.{}", self.root_domain)
    }

    /// CNAME target at `name` without the trailing dot, or `None` when the
    /// lookup failed for any reason.
    pub async fn get_cname(&self, name: &str) -> Option<String> {
        match self.lookup.cname(name).await {
            Ok(target) => Some(target.trim_end_matches('.').to_string()),
            Err(e) => {
                log_lookup_failure("CNAME", name, &e);
                None
            }
        }
    }

    /// TXT values at `name`; empty when the lookup failed for any reason.
    pub async fn get_txt(&self, name: &str) -> Vec<String> {
        match self.lookup.txt(name).await {
            Ok(values) => values,
            Err(e) => {
                log_lookup_failure("TXT", name, &e);
                Vec::new()
            }
        }
    }

    /// True when the challenge CNAME matches and the site CNAME matches
    /// (or `skip_site_check` is set).
    pub async fn has_valid_dns(&self, domain: &str, skip_site_check: bool) -> bool {
        let challenge_name = Self::acme_challenge_cname_name(domain);
        let expected = self.acme_challenge_cname_target(domain);
        let challenge_ok = self.cname_matches(&challenge_name, &expected).await;
        if !challenge_ok {
            return false;
        }

        if skip_site_check {
            debug!(domain, "Skipping site CNAME check");
            return true;
        }

        let expected = self.site_cname_target(domain);
        self.cname_matches(domain, &expected).await
    }

    /// All domains must pass; an empty list never passes.
    pub async fn domains_have_valid_dns(&self, domains: &[String], skip_site_check: bool) -> bool {
        if domains.is_empty() {
            warn!("No domains to validate");
            return false;
        }
        for domain in domains {
            if !self.has_valid_dns(domain, skip_site_check).await {
                return false;
            }
        }
        true
    }

    /// True when the challenge name carries a TXT record equal to the
    /// configured semaphore. Always false without one.
    pub async fn has_expected_semaphore(&self, domain: &str) -> bool {
        let Some(semaphore) = &self.semaphore else {
            debug!(domain, "No semaphore configured");
            return false;
        };
        let name = Self::acme_challenge_cname_name(domain);
        self.get_txt(&name).await.iter().any(|v| v == semaphore)
    }

    async fn cname_matches(&self, name: &str, expected: &str) -> bool {
        match self.get_cname(name).await {
            Some(target) if target == expected => true,
            Some(target) => {
                warn!(name, target, expected, "CNAME points elsewhere");
                false
            }
            None => false,
        }
    }
}

fn log_lookup_failure(record_type: &str, name: &str, err: &LookupError) {
    match err {
        LookupError::NxDomain => warn!(name, record_type, "got NXDOMAIN"),
        LookupError::NoAnswer => warn!(name, record_type, "dns resolver got NoAnswer"),
        LookupError::Timeout => warn!(name, record_type, "dns resolver got Timeout"),
        LookupError::Other(msg) => error!(name, record_type, "dns resolver failed: {msg}"),
    }
}
