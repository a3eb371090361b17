// src/storage/sqlite.rs

//! SQLite + filesystem backend
//!
//! Layout under the root directory:
//!
//! ```text
//! metadata.db           package records
//! packages/{id}.{ext}   uploaded packages
//! icons/{id}.png        extracted icons
//! tmp/                  staged uploads
//! ```

use super::schema;
use super::{NewPackage, PackageRecord, Storage};
use crate::id::PackageId;
use crate::packages::PackageFormat;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DB_FILE: &str = "metadata.db";
const PACKAGES_DIR: &str = "packages";
const ICONS_DIR: &str = "icons";
const STAGING_DIR: &str = "tmp";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str = "SELECT id, name, identifier, version, build, channel, comment,
        format, has_icon, size, created_at FROM packages";

/// Storage rooted at a single directory
///
/// Opens a fresh connection per operation, so it is cheap to share
/// between blocking workers.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    root: PathBuf,
    db_path: PathBuf,
    staging: PathBuf,
}

impl SqliteStorage {
    /// Open (creating if needed) the store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [PACKAGES_DIR, ICONS_DIR, STAGING_DIR] {
            fs::create_dir_all(root.join(dir)).map_err(|e| {
                Error::Storage(format!("failed to create {}: {}", root.join(dir).display(), e))
            })?;
        }

        let storage = Self {
            db_path: root.join(DB_FILE),
            staging: root.join(STAGING_DIR),
            root,
        };

        let conn = storage.conn()?;
        schema::migrate(&conn)?;
        storage.sweep_staging();

        info!("Package store opened at {}", storage.root.display());
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| Error::Storage(format!("failed to open database: {}", e)))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Remove uploads left behind by a previous process
    fn sweep_staging(&self) {
        let Ok(entries) = fs::read_dir(&self.staging) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                debug!("Removing stale upload {}", path.display());
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to remove stale upload {}: {}", path.display(), e);
                }
            }
        }
    }

    fn package_file(&self, id: &PackageId, format: PackageFormat) -> PathBuf {
        self.root
            .join(PACKAGES_DIR)
            .join(format!("{}.{}", id, format.extension()))
    }

    fn icon_file(&self, id: &PackageId) -> PathBuf {
        self.root.join(ICONS_DIR).join(format!("{}.png", id))
    }

    fn query(&self, sql: &str, param: Option<&str>) -> Result<Vec<PackageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match param {
            Some(p) => stmt.query_map([p], record_from_row)?,
            None => stmt.query_map([], record_from_row)?,
        };
        let records = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<PackageRecord> {
    let id: String = row.get(0)?;
    let id = PackageId::parse(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    let format: u8 = row.get(7)?;
    let format = PackageFormat::from_u8(format).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Integer,
            format!("unknown package format {}", format).into(),
        )
    })?;

    let size: i64 = row.get(9)?;
    let created_at: String = row.get(10)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(PackageRecord {
        id,
        name: row.get(1)?,
        identifier: row.get(2)?,
        version: row.get(3)?,
        build: row.get(4)?,
        channel: row.get(5)?,
        comment: row.get(6)?,
        format,
        has_icon: row.get(8)?,
        size: size.max(0) as u64,
        created_at,
    })
}

impl Storage for SqliteStorage {
    fn staging_dir(&self) -> &Path {
        &self.staging
    }

    fn insert(&self, package: NewPackage, cancel: &CancellationToken) -> Result<PackageRecord> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let id = PackageId::generate();
        let package_path = self.package_file(&id, package.format);
        let icon_path = self.icon_file(&id);

        if let Some(icon) = &package.icon {
            fs::write(&icon_path, icon)?;
        }
        let cleanup = || {
            remove_quietly(&package_path);
            remove_quietly(&icon_path);
        };

        if let Err(e) = package.file.persist(&package_path) {
            cleanup();
            return Err(e.error.into());
        }

        if cancel.is_cancelled() {
            cleanup();
            return Err(Error::Cancelled);
        }

        let record = PackageRecord {
            id,
            name: package.name,
            identifier: package.identifier,
            version: package.version,
            build: package.build,
            channel: package.channel,
            comment: String::new(),
            format: package.format,
            has_icon: package.icon.is_some(),
            size: package.size,
            created_at: Utc::now(),
        };

        let inserted = self.conn().and_then(|conn| {
            conn.execute(
                "INSERT INTO packages (id, name, identifier, version, build, channel, comment,
                     format, has_icon, size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id.as_str(),
                    &record.name,
                    &record.identifier,
                    &record.version,
                    &record.build,
                    &record.channel,
                    &record.comment,
                    record.format.as_u8(),
                    record.has_icon,
                    record.size as i64,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        });

        if let Err(e) = inserted {
            error!("Failed to record package {}: {}", record.id, e);
            cleanup();
            return Err(e);
        }

        Ok(record)
    }

    fn get(&self, id: &PackageId) -> Result<Option<PackageRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id.as_str()],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn all(&self) -> Result<Vec<PackageRecord>> {
        self.query(&format!("{} ORDER BY rowid DESC", SELECT_COLUMNS), None)
    }

    fn by_identifier(&self, identifier: &str) -> Result<Vec<PackageRecord>> {
        self.query(
            &format!("{} WHERE identifier = ?1 ORDER BY rowid DESC", SELECT_COLUMNS),
            Some(identifier),
        )
    }

    fn set_comment(&self, id: &PackageId, comment: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE packages SET comment = ?1 WHERE id = ?2",
            params![comment, id.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn remove(&self, id: &PackageId) -> Result<bool> {
        let Some(record) = self.get(id)? else {
            return Ok(false);
        };

        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM packages WHERE id = ?1", [id.as_str()])?;
        if removed == 0 {
            return Ok(false);
        }

        remove_quietly(&self.package_path(&record));
        if let Some(icon) = self.icon_path(&record) {
            remove_quietly(&icon);
        }
        Ok(true)
    }

    fn package_path(&self, record: &PackageRecord) -> PathBuf {
        self.package_file(&record.id, record.format)
    }

    fn icon_path(&self, record: &PackageRecord) -> Option<PathBuf> {
        record.has_icon.then(|| self.icon_file(&record.id))
    }
}
