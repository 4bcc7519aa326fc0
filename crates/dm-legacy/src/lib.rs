//! Legacy broker records: routes, their certificates and ALB proxies,
//! plus the selector that picks which routes are due for migration.

pub mod models;
pub mod selector;
pub mod store;

pub use models::{AlbProxy, Certificate, Route, RouteKind, RouteOrigin, RouteState, parse_domain_list};
pub use selector::CandidateSelector;
pub use store::{RouteStore, SqliteRouteStore, StoreError, StoreResult};
