use chrono::{DateTime, Utc};

/// Lifecycle state of a legacy route. Only `Provisioned` and
/// `MigrationFailed` are ever picked up for migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteState {
    Provisioned,
    MigrationFailed,
    Migrated,
    Deprovisioning,
    Deprovisioned,
    Other(String),
}

impl RouteState {
    pub const MIGRATABLE: [RouteState; 2] = [RouteState::Provisioned, RouteState::MigrationFailed];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisioned => "provisioned",
            Self::MigrationFailed => "migration_failed",
            Self::Migrated => "migrated",
            Self::Deprovisioning => "deprovisioning",
            Self::Deprovisioned => "deprovisioned",
            Self::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "provisioned" => Self::Provisioned,
            "migration_failed" => Self::MigrationFailed,
            "migrated" => Self::Migrated,
            "deprovisioning" => Self::Deprovisioning,
            "deprovisioned" => Self::Deprovisioned,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_migratable(&self) -> bool {
        Self::MIGRATABLE.contains(self)
    }
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared load balancer + listener pair; many domain routes point at one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbProxy {
    pub arn: String,
    pub listener_arn: String,
    pub dns_name: String,
}

/// Server certificate uploaded for a route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Certificate {
    pub name: Option<String>,
    pub iam_id: Option<String>,
    pub arn: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Cdn,
    Domain,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cdn => "cdn",
            Self::Domain => "domain",
        }
    }
}

/// What a route serves traffic through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOrigin {
    Cdn {
        /// Distribution id; cleared right before the legacy instance is purged.
        dist_id: Option<String>,
        /// Hostname of the distribution itself.
        domain_internal: Option<String>,
    },
    Alb { proxy: Option<AlbProxy> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub instance_id: String,
    pub state: RouteState,
    /// Customer-facing hostnames in their stored order.
    pub domains: Vec<String>,
    pub certificates: Vec<Certificate>,
    pub origin: RouteOrigin,
}

impl Route {
    pub fn kind(&self) -> RouteKind {
        match self.origin {
            RouteOrigin::Cdn { .. } => RouteKind::Cdn,
            RouteOrigin::Alb { .. } => RouteKind::Domain,
        }
    }

    pub fn dist_id(&self) -> Option<&str> {
        match &self.origin {
            RouteOrigin::Cdn { dist_id, .. } => dist_id.as_deref(),
            RouteOrigin::Alb { .. } => None,
        }
    }

    pub fn alb_proxy(&self) -> Option<&AlbProxy> {
        match &self.origin {
            RouteOrigin::Alb { proxy } => proxy.as_ref(),
            RouteOrigin::Cdn { .. } => None,
        }
    }

    /// The non-deleted certificate expiring last. Certificates without an
    /// expiry sort before any dated one.
    pub fn current_certificate(&self) -> Option<&Certificate> {
        self.certificates
            .iter()
            .filter(|c| c.deleted_at.is_none())
            .max_by_key(|c| c.expires)
    }

    pub fn is_migratable(&self) -> bool {
        self.state.is_migratable()
    }
}

/// Split a stored comma-delimited domain column. Blank entries and repeats
/// are dropped; first-seen order is kept.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for domain in raw.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        if !domains.iter().any(|d| d == domain) {
            domains.push(domain.to_string());
        }
    }
    domains
}
