use std::sync::Arc;

use tracing::info;

use crate::models::{Route, RouteState};
use crate::store::{RouteStore, StoreError, StoreResult};

/// Read-only view over the route store that answers "what should be
/// migrated".
#[derive(Clone)]
pub struct CandidateSelector {
    store: Arc<dyn RouteStore>,
}

impl CandidateSelector {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self { store }
    }

    /// Every provisioned or previously failed route, CDN and domain alike.
    pub fn find_candidates(&self) -> StoreResult<Vec<Route>> {
        let routes = self.store.find_by_states(&RouteState::MIGRATABLE)?;
        info!(count = routes.len(), "Found migration candidates");
        Ok(routes)
    }

    /// The route for `instance_id` in whatever state it is in.
    pub fn find_by_instance_id(&self, instance_id: &str) -> StoreResult<Route> {
        self.store
            .find_by_instance_id(instance_id)?
            .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))
    }
}
