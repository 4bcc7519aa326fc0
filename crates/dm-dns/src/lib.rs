//! DNS gate for migrations: checks that a customer domain already points
//! its challenge and site CNAMEs at the platform before cutover.

pub mod lookup;
pub mod validator;

pub use lookup::{DnsLookup, HickoryLookup, LookupError};
pub use validator::DnsValidator;
