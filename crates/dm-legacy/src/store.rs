use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{AlbProxy, Certificate, Route, RouteOrigin, RouteState, parse_domain_list};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("route not found: {0}")]
    NotFound(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("route store lock poisoned")]
    Poisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence the migrator needs from the legacy broker database.
/// Writes are limited to a route's `state` and a CDN route's distribution
/// reference; each write is committed before returning.
pub trait RouteStore: Send + Sync {
    /// CDN routes first, then domain routes, each in insertion order.
    fn find_by_states(&self, states: &[RouteState]) -> StoreResult<Vec<Route>>;

    fn find_by_instance_id(&self, instance_id: &str) -> StoreResult<Option<Route>>;

    fn set_state(&self, instance_id: &str, state: &RouteState) -> StoreResult<()>;

    fn clear_distribution(&self, instance_id: &str) -> StoreResult<()>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cdn_routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id TEXT NOT NULL UNIQUE,
    state TEXT NOT NULL,
    domain_external TEXT NOT NULL DEFAULT '',
    domain_internal TEXT,
    dist_id TEXT
);
CREATE TABLE IF NOT EXISTS cdn_certificates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    route_id INTEGER NOT NULL REFERENCES cdn_routes(id),
    name TEXT,
    iam_id TEXT,
    arn TEXT,
    expires TEXT,
    deleted_at TEXT
);
CREATE TABLE IF NOT EXISTS alb_proxies (
    alb_arn TEXT PRIMARY KEY,
    listener_arn TEXT NOT NULL,
    alb_dns_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS domain_routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id TEXT NOT NULL UNIQUE,
    state TEXT NOT NULL,
    domains TEXT NOT NULL DEFAULT '',
    alb_proxy_arn TEXT REFERENCES alb_proxies(alb_arn)
);
CREATE TABLE IF NOT EXISTS domain_certificates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    route_id INTEGER NOT NULL REFERENCES domain_routes(id),
    name TEXT,
    iam_id TEXT,
    arn TEXT,
    expires TEXT,
    deleted_at TEXT
);
";

/// [`RouteStore`] over a single SQLite connection.
pub struct SqliteRouteStore {
    conn: Mutex<Connection>,
}

impl SqliteRouteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!(path = %path.as_ref().display(), "Opened legacy route store");
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert a route with its certificates (and ALB proxy, shared proxies
    /// are inserted once). Used to seed fixtures and local databases.
    pub fn insert_route(&self, route: &Route) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let domains = route.domains.join(",");

        let (route_id, cert_table) = match &route.origin {
            RouteOrigin::Cdn {
                dist_id,
                domain_internal,
            } => {
                tx.execute(
                    "INSERT INTO cdn_routes (instance_id, state, domain_external, domain_internal, dist_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![route.instance_id, route.state.as_str(), domains, domain_internal, dist_id],
                )?;
                (tx.last_insert_rowid(), "cdn_certificates")
            }
            RouteOrigin::Alb { proxy } => {
                if let Some(proxy) = proxy {
                    tx.execute(
                        "INSERT OR IGNORE INTO alb_proxies (alb_arn, listener_arn, alb_dns_name)
                         VALUES (?1, ?2, ?3)",
                        params![proxy.arn, proxy.listener_arn, proxy.dns_name],
                    )?;
                }
                tx.execute(
                    "INSERT INTO domain_routes (instance_id, state, domains, alb_proxy_arn)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        route.instance_id,
                        route.state.as_str(),
                        domains,
                        proxy.as_ref().map(|p| &p.arn)
                    ],
                )?;
                (tx.last_insert_rowid(), "domain_certificates")
            }
        };

        for cert in &route.certificates {
            tx.execute(
                &format!(
                    "INSERT INTO {cert_table} (route_id, name, iam_id, arn, expires, deleted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    route_id,
                    cert.name,
                    cert.iam_id,
                    cert.arn,
                    cert.expires.map(|d| d.to_rfc3339()),
                    cert.deleted_at.map(|d| d.to_rfc3339()),
                ],
            )?;
        }

        tx.commit()?;
        debug!(instance_id = %route.instance_id, kind = route.kind().as_str(), "Inserted route");
        Ok(())
    }
}

struct RouteRow {
    id: i64,
    instance_id: String,
    state: String,
    domains: String,
}

fn route_row(row: &Row<'_>) -> rusqlite::Result<RouteRow> {
    Ok(RouteRow {
        id: row.get("id")?,
        instance_id: row.get("instance_id")?,
        state: row.get("state")?,
        domains: row.get("domains")?,
    })
}

fn parse_timestamp(raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
    })
    .transpose()
}

fn load_certificates(conn: &Connection, table: &str, route_id: i64) -> StoreResult<Vec<Certificate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name, iam_id, arn, expires, deleted_at FROM {table} WHERE route_id = ?1 ORDER BY id"
    ))?;
    let raw = stmt
        .query_map([route_id], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(name, iam_id, arn, expires, deleted_at)| {
            Ok(Certificate {
                name,
                iam_id,
                arn,
                expires: parse_timestamp(expires)?,
                deleted_at: parse_timestamp(deleted_at)?,
            })
        })
        .collect()
}

const CDN_SELECT: &str = "SELECT id, instance_id, state, domain_external AS domains, domain_internal, dist_id
                          FROM cdn_routes";
const DOMAIN_SELECT: &str = "SELECT r.id, r.instance_id, r.state, r.domains,
                                    p.alb_arn, p.listener_arn, p.alb_dns_name
                             FROM domain_routes r LEFT JOIN alb_proxies p ON p.alb_arn = r.alb_proxy_arn";

fn query_cdn(conn: &Connection, filter: &str, args: &[String]) -> StoreResult<Vec<Route>> {
    let mut stmt = conn.prepare(&format!("{CDN_SELECT} {filter} ORDER BY id"))?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            Ok((
                route_row(row)?,
                row.get::<_, Option<String>>("domain_internal")?,
                row.get::<_, Option<String>>("dist_id")?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(r, domain_internal, dist_id)| {
            Ok(Route {
                certificates: load_certificates(conn, "cdn_certificates", r.id)?,
                instance_id: r.instance_id,
                state: RouteState::parse(&r.state),
                domains: parse_domain_list(&r.domains),
                origin: RouteOrigin::Cdn {
                    dist_id,
                    domain_internal,
                },
            })
        })
        .collect()
}

fn query_domain(conn: &Connection, filter: &str, args: &[String]) -> StoreResult<Vec<Route>> {
    let mut stmt = conn.prepare(&format!("{DOMAIN_SELECT} {filter} ORDER BY r.id"))?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            let arn: Option<String> = row.get("alb_arn")?;
            let proxy = match arn {
                Some(arn) => Some(AlbProxy {
                    arn,
                    listener_arn: row.get("listener_arn")?,
                    dns_name: row.get("alb_dns_name")?,
                }),
                None => None,
            };
            Ok((route_row(row)?, proxy))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(r, proxy)| {
            Ok(Route {
                certificates: load_certificates(conn, "domain_certificates", r.id)?,
                instance_id: r.instance_id,
                state: RouteState::parse(&r.state),
                domains: parse_domain_list(&r.domains),
                origin: RouteOrigin::Alb { proxy },
            })
        })
        .collect()
}

impl RouteStore for SqliteRouteStore {
    fn find_by_states(&self, states: &[RouteState]) -> StoreResult<Vec<Route>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; states.len()].join(", ");
        let args: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();

        let conn = self.conn()?;
        let mut routes = query_cdn(&conn, &format!("WHERE state IN ({placeholders})"), &args)?;
        routes.extend(query_domain(
            &conn,
            &format!("WHERE r.state IN ({placeholders})"),
            &args,
        )?);
        Ok(routes)
    }

    fn find_by_instance_id(&self, instance_id: &str) -> StoreResult<Option<Route>> {
        let conn = self.conn()?;
        let args = [instance_id.to_string()];
        if let Some(route) = query_cdn(&conn, "WHERE instance_id = ?1", &args)?.into_iter().next() {
            return Ok(Some(route));
        }
        Ok(query_domain(&conn, "WHERE r.instance_id = ?1", &args)?
            .into_iter()
            .next())
    }

    fn set_state(&self, instance_id: &str, state: &RouteState) -> StoreResult<()> {
        let conn = self.conn()?;
        let mut changed = conn.execute(
            "UPDATE cdn_routes SET state = ?1 WHERE instance_id = ?2",
            params![state.as_str(), instance_id],
        )?;
        if changed == 0 {
            changed = conn.execute(
                "UPDATE domain_routes SET state = ?1 WHERE instance_id = ?2",
                params![state.as_str(), instance_id],
            )?;
        }
        if changed == 0 {
            return Err(StoreError::NotFound(instance_id.to_string()));
        }
        debug!(instance_id, state = state.as_str(), "Route state updated");
        Ok(())
    }

    fn clear_distribution(&self, instance_id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let existing: Option<Option<String>> = conn
            .query_row(
                "SELECT dist_id FROM cdn_routes WHERE instance_id = ?1",
                [instance_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_none() {
            return Err(StoreError::NotFound(instance_id.to_string()));
        }
        conn.execute(
            "UPDATE cdn_routes SET dist_id = NULL WHERE instance_id = ?1",
            [instance_id],
        )?;
        debug!(instance_id, "Cleared distribution reference");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cdn_route(id: &str, state: RouteState) -> Route {
        Route {
            instance_id: id.to_string(),
            state,
            domains: vec!["example.com".into(), "foo.com".into()],
            certificates: vec![Certificate {
                name: Some("cert-1".into()),
                iam_id: Some("ASCAEXAMPLE".into()),
                arn: Some("arn:aws:iam::000000000000:server-certificate/cert-1".into()),
                expires: Some(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()),
                deleted_at: None,
            }],
            origin: RouteOrigin::Cdn {
                dist_id: Some("sample-distribution-id".into()),
                domain_internal: Some("example.cloudfront.net".into()),
            },
        }
    }

    fn alb_route(id: &str, state: RouteState) -> Route {
        Route {
            instance_id: id.to_string(),
            state,
            domains: vec!["www.example.gov".into()],
            certificates: vec![],
            origin: RouteOrigin::Alb {
                proxy: Some(AlbProxy {
                    arn: "alb-arn-0".into(),
                    listener_arn: "listener-arn-0".into(),
                    dns_name: "alb.cloud.test".into(),
                }),
            },
        }
    }

    #[test]
    fn test_round_trip_cdn_route() {
        let store = SqliteRouteStore::open_in_memory().unwrap();
        let route = cdn_route("asdf-asdf", RouteState::Provisioned);
        store.insert_route(&route).unwrap();

        let loaded = store.find_by_instance_id("asdf-asdf").unwrap().unwrap();
        assert_eq!(loaded, route);
    }

    #[test]
    fn test_shared_alb_proxy() {
        let store = SqliteRouteStore::open_in_memory().unwrap();
        store.insert_route(&alb_route("one", RouteState::Provisioned)).unwrap();
        store.insert_route(&alb_route("two", RouteState::Provisioned)).unwrap();

        let two = store.find_by_instance_id("two").unwrap().unwrap();
        assert_eq!(two.alb_proxy().unwrap().dns_name, "alb.cloud.test");
    }

    #[test]
    fn test_find_by_states_spans_both_kinds() {
        let store = SqliteRouteStore::open_in_memory().unwrap();
        store.insert_route(&cdn_route("cdn-1", RouteState::Provisioned)).unwrap();
        store.insert_route(&alb_route("alb-1", RouteState::MigrationFailed)).unwrap();
        store.insert_route(&cdn_route("cdn-2", RouteState::Migrated)).unwrap();

        let ids: Vec<String> = store
            .find_by_states(&RouteState::MIGRATABLE)
            .unwrap()
            .into_iter()
            .map(|r| r.instance_id)
            .collect();
        assert_eq!(ids, vec!["cdn-1", "alb-1"]);
        assert!(store.find_by_states(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_set_state() {
        let store = SqliteRouteStore::open_in_memory().unwrap();
        store.insert_route(&alb_route("alb-1", RouteState::Provisioned)).unwrap();

        store.set_state("alb-1", &RouteState::Migrated).unwrap();
        let loaded = store.find_by_instance_id("alb-1").unwrap().unwrap();
        assert_eq!(loaded.state, RouteState::Migrated);

        assert!(matches!(
            store.set_state("missing", &RouteState::Migrated),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_clear_distribution() {
        let store = SqliteRouteStore::open_in_memory().unwrap();
        store.insert_route(&cdn_route("cdn-1", RouteState::Provisioned)).unwrap();
        store.insert_route(&alb_route("alb-1", RouteState::Provisioned)).unwrap();

        store.clear_distribution("cdn-1").unwrap();
        let loaded = store.find_by_instance_id("cdn-1").unwrap().unwrap();
        assert_eq!(loaded.dist_id(), None);

        assert!(matches!(
            store.clear_distribution("alb-1"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_route() {
        let store = SqliteRouteStore::open_in_memory().unwrap();
        assert!(store.find_by_instance_id("nope").unwrap().is_none());
    }
}
