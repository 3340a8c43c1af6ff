//! SQLite state database
//!
//! Tracks installed packages, their dependencies and an append-only history.
//! Every write runs inside one transaction; the database is opened in WAL mode
//! with `synchronous=FULL` so a committed record survives a crash and an
//! uncommitted one is never visible.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use keel_schema::{PackageName, Sha256Digest, Version};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record for '{name}': {reason}")]
    Corrupt { name: String, reason: String },

    #[error("Database actor is no longer running")]
    ActorDied,
}

/// Lifecycle state of an install record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Installed,
    Failed,
    RolledBack,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled-back",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installed" => Ok(Self::Installed),
            "failed" => Ok(Self::Failed),
            "rolled-back" => Ok(Self::RolledBack),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Durable proof that a specific version is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRecord {
    pub name: PackageName,
    pub version: Version,
    pub sha256: Sha256Digest,
    /// Unix seconds.
    pub installed_at: i64,
    pub status: RecordStatus,
    pub dependencies: Vec<PackageName>,
}

impl InstallRecord {
    /// Whether this record proves `version` with `sha256` is in place.
    pub fn satisfies(&self, version: &Version, sha256: &Sha256Digest) -> bool {
        self.status == RecordStatus::Installed && &self.version == version && &self.sha256 == sha256
    }
}

/// History event record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEvent {
    pub id: i64,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub action: String, // "install", "upgrade", "uninstall", "rollback"
    pub package: String,
    pub version: Option<String>,
    pub sha256: Option<String>,
    pub success: bool,
    pub detail: Option<String>,
}

/// A history entry about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistory {
    pub action: String,
    pub package: PackageName,
    pub version: Option<Version>,
    pub sha256: Option<Sha256Digest>,
    pub success: bool,
    pub detail: Option<String>,
}

impl NewHistory {
    pub fn new(action: &str, package: &PackageName, success: bool) -> Self {
        Self {
            action: action.to_string(),
            package: package.clone(),
            version: None,
            sha256: None,
            success,
            detail: None,
        }
    }

    pub fn version(mut self, version: &Version) -> Self {
        self.version = Some(version.clone());
        self
    }

    pub fn sha256(mut self, sha256: &Sha256Digest) -> Self {
        self.sha256 = Some(sha256.clone());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// State database for tracking installations
pub struct StateDb {
    conn: Connection,
}

impl fmt::Debug for StateDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDb")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

impl StateDb {
    /// Open or create the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// A throwaway database (for testing and `--dry-run`).
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS packages (
                name TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                installed_at INTEGER NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dependencies (
                package TEXT NOT NULL REFERENCES packages(name) ON DELETE CASCADE,
                dependency TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (package, dependency)
            );

            CREATE INDEX IF NOT EXISTS idx_dependencies_dependency
                ON dependencies(dependency);

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                action TEXT NOT NULL,
                package TEXT NOT NULL,
                version TEXT,
                sha256 TEXT,
                success INTEGER NOT NULL,
                detail TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_package ON history(package);
            ",
        )?;
        Ok(Self { conn })
    }

    /// Current record for `name`, if any.
    pub fn get(&self, name: &PackageName) -> Result<Option<InstallRecord>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, version, sha256, installed_at, status FROM packages WHERE name = ?1",
                params![name.as_str()],
                RawRecord::from_row,
            )
            .optional()?;

        row.map(|raw| self.hydrate(raw)).transpose()
    }

    /// Insert or replace a record and its dependency rows in one transaction.
    pub fn put(&mut self, record: &InstallRecord) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO packages (name, version, sha256, installed_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.name.as_str(),
                record.version.to_string(),
                record.sha256.as_str(),
                record.installed_at,
                record.status.as_str(),
            ],
        )?;
        // INSERT OR REPLACE deletes the old row, cascading its dependencies.
        tx.execute(
            "DELETE FROM dependencies WHERE package = ?1",
            params![record.name.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO dependencies (package, dependency, position)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (pos, dep) in record.dependencies.iter().enumerate() {
                stmt.execute(params![record.name.as_str(), dep.as_str(), pos as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Change only the status of an existing record. Returns whether it existed.
    pub fn set_status(&mut self, name: &PackageName, status: RecordStatus) -> Result<bool, DbError> {
        let updated = self.conn.execute(
            "UPDATE packages SET status = ?2 WHERE name = ?1",
            params![name.as_str(), status.as_str()],
        )?;
        Ok(updated > 0)
    }

    /// Delete a record and its dependency rows, returning what was removed.
    pub fn remove(&mut self, name: &PackageName) -> Result<Option<InstallRecord>, DbError> {
        let Some(record) = self.get(name)? else {
            return Ok(None);
        };
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM dependencies WHERE package = ?1",
            params![name.as_str()],
        )?;
        tx.execute("DELETE FROM packages WHERE name = ?1", params![name.as_str()])?;
        tx.commit()?;
        Ok(Some(record))
    }

    /// All records, sorted by name.
    pub fn list_all(&self) -> Result<Vec<InstallRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, version, sha256, installed_at, status FROM packages ORDER BY name",
        )?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(|raw| self.hydrate(raw)).collect()
    }

    /// Names of installed packages that declare `name` as a dependency.
    pub fn dependents(&self, name: &PackageName) -> Result<Vec<PackageName>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.package FROM dependencies d
             JOIN packages p ON p.name = d.package
             WHERE d.dependency = ?1 AND p.status = 'installed'
             ORDER BY d.package",
        )?;
        let names = stmt
            .query_map(params![name.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names.into_iter().map(PackageName::from).collect())
    }

    pub fn add_history(&self, event: &NewHistory) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO history (timestamp, action, package, version, sha256, success, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                now,
                event.action,
                event.package.as_str(),
                event.version.as_ref().map(ToString::to_string),
                event.sha256.as_ref().map(Sha256Digest::as_str),
                event.success,
                event.detail,
            ],
        )?;
        Ok(())
    }

    /// History for one package, oldest first.
    pub fn history(&self, name: &PackageName) -> Result<Vec<HistoryEvent>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, action, package, version, sha256, success, detail
             FROM history WHERE package = ?1 ORDER BY id",
        )?;
        let events = stmt
            .query_map(params![name.as_str()], |row| {
                Ok(HistoryEvent {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    action: row.get(2)?,
                    package: row.get(3)?,
                    version: row.get(4)?,
                    sha256: row.get(5)?,
                    success: row.get(6)?,
                    detail: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn hydrate(&self, raw: RawRecord) -> Result<InstallRecord, DbError> {
        let corrupt = |reason: String| DbError::Corrupt {
            name: raw.name.clone(),
            reason,
        };
        let version = Version::parse(&raw.version).map_err(|e| corrupt(e.to_string()))?;
        let sha256 = Sha256Digest::new(&raw.sha256).map_err(|e| corrupt(e.to_string()))?;
        let status = raw.status.parse().map_err(corrupt)?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT dependency FROM dependencies WHERE package = ?1 ORDER BY position",
        )?;
        let dependencies = stmt
            .query_map(params![raw.name], |row| row.get::<_, String>(0))?
            .map(|r| r.map(PackageName::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InstallRecord {
            name: PackageName::from(raw.name),
            version,
            sha256,
            installed_at: raw.installed_at,
            status,
            dependencies,
        })
    }
}

struct RawRecord {
    name: String,
    version: String,
    sha256: String,
    installed_at: i64,
    status: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            sha256: row.get(2)?,
            installed_at: row.get(3)?,
            status: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, version: &str, deps: &[&str]) -> InstallRecord {
        InstallRecord {
            name: PackageName::new(name),
            version: Version::parse(version).unwrap(),
            sha256: Sha256Digest::from_bytes(&[7; 32]),
            installed_at: 1_700_000_000,
            status: RecordStatus::Installed,
            dependencies: deps.iter().map(|d| PackageName::new(d)).collect(),
        }
    }

    #[test]
    fn test_put_get_roundtrip() {
        let mut db = StateDb::open_in_memory().unwrap();
        let rec = record("grpc_ruby", "0.6.0", &["grpc", "openssl"]);
        db.put(&rec).unwrap();

        let got = db.get(&PackageName::new("grpc_ruby")).unwrap().unwrap();
        assert_eq!(got, rec);
        assert!(got.satisfies(&rec.version, &rec.sha256));
        assert!(db.get(&PackageName::new("grpc")).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_dependencies() {
        let mut db = StateDb::open_in_memory().unwrap();
        db.put(&record("app", "1.0.0", &["a", "b"])).unwrap();
        db.put(&record("app", "2.0.0", &["c"])).unwrap();

        let got = db.get(&PackageName::new("app")).unwrap().unwrap();
        assert_eq!(got.version, Version::new(2, 0, 0));
        assert_eq!(got.dependencies, vec![PackageName::new("c")]);
        assert_eq!(db.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_dependents_and_remove() {
        let mut db = StateDb::open_in_memory().unwrap();
        db.put(&record("zlib", "1.3.0", &[])).unwrap();
        db.put(&record("curl", "8.0.0", &["zlib"])).unwrap();
        db.put(&record("git", "2.0.0", &["zlib", "curl"])).unwrap();

        let zlib = PackageName::new("zlib");
        assert_eq!(
            db.dependents(&zlib).unwrap(),
            vec![PackageName::new("curl"), PackageName::new("git")]
        );

        db.set_status(&PackageName::new("git"), RecordStatus::RolledBack)
            .unwrap();
        assert_eq!(db.dependents(&zlib).unwrap(), vec![PackageName::new("curl")]);

        let removed = db.remove(&PackageName::new("curl")).unwrap().unwrap();
        assert_eq!(removed.version, Version::new(8, 0, 0));
        assert!(db.remove(&PackageName::new("curl")).unwrap().is_none());
        assert!(db.dependents(&zlib).unwrap().is_empty());
    }

    #[test]
    fn test_history_order() {
        let db = StateDb::open_in_memory().unwrap();
        let name = PackageName::new("grpc");
        db.add_history(&NewHistory::new("install", &name, true).version(&Version::new(0, 6, 0)))
            .unwrap();
        db.add_history(&NewHistory::new("uninstall", &name, true).detail("by request"))
            .unwrap();

        let events = db.history(&name).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "install");
        assert_eq!(events[0].version.as_deref(), Some("0.6.0"));
        assert_eq!(events[1].detail.as_deref(), Some("by request"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let mut db = StateDb::open_at(&path).unwrap();
            db.put(&record("jq", "1.7.1", &[])).unwrap();
        }
        let db = StateDb::open_at(&path).unwrap();
        let rec = db.get(&PackageName::new("jq")).unwrap().unwrap();
        assert_eq!(rec.status, RecordStatus::Installed);
    }
}
