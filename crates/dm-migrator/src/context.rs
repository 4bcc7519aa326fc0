use dm_legacy::Route;

use crate::cdn::Distribution;
use crate::extract::CertificateIdentity;

/// Everything looked up while migrating one route. Each field is fetched at
/// most once and the whole thing is dropped when the run ends.
#[derive(Debug, Clone, Default)]
pub struct MigrationContext {
    pub instance_id: String,
    pub domains: Vec<String>,
    /// Display name of the legacy instance, captured before any mutation.
    pub legacy_name: Option<String>,
    pub space_id: Option<String>,
    pub org_id: Option<String>,
    pub new_instance_id: Option<String>,
    pub distribution: Option<Distribution>,
    /// Identity from the certificate store, used only when the route has no
    /// usable certificate record of its own.
    pub fallback_certificate: Option<CertificateIdentity>,
}

impl MigrationContext {
    pub fn new(route: &Route) -> Self {
        Self {
            instance_id: route.instance_id.clone(),
            domains: route.domains.clone(),
            ..Default::default()
        }
    }

    /// `(label, value)` pairs for alerts; unresolved values show as `-`.
    pub fn triage_fields(&self) -> Vec<(&'static str, String)> {
        let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        vec![
            ("instance id", self.instance_id.clone()),
            ("domains", self.domains.join(", ")),
            ("legacy name", or_dash(&self.legacy_name)),
            ("space id", or_dash(&self.space_id)),
            ("org id", or_dash(&self.org_id)),
            ("new instance id", or_dash(&self.new_instance_id)),
        ]
    }
}
