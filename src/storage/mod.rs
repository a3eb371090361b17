// src/storage/mod.rs

//! Package persistence
//!
//! The catalog talks to storage only through the `Storage` trait. The
//! shipped backend keeps metadata in SQLite and package/icon bytes as
//! plain files under one root directory.

pub mod schema;
mod sqlite;

pub use sqlite::SqliteStorage;

use crate::Result;
use crate::id::PackageId;
use crate::packages::PackageFormat;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;

/// A cataloged upload
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRecord {
    pub id: PackageId,
    /// Display name chosen at upload time
    pub name: String,
    /// Bundle identifier (iOS) or package name (Android)
    pub identifier: String,
    pub version: String,
    pub build: String,
    pub channel: Option<String>,
    /// Free-form note; the only mutable field
    pub comment: String,
    pub format: PackageFormat,
    pub has_icon: bool,
    /// Package size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to commit a freshly decoded upload
#[derive(Debug)]
pub struct NewPackage {
    pub name: String,
    pub identifier: String,
    pub version: String,
    pub build: String,
    pub channel: Option<String>,
    pub format: PackageFormat,
    pub size: u64,
    /// Normalized PNG icon, when one was extracted
    pub icon: Option<Vec<u8>>,
    /// Staged package bytes; removed on drop unless persisted
    pub file: TempPath,
}

/// Storage backend interface
///
/// All methods block; async callers run them on a blocking worker.
/// Listings are ordered newest first.
pub trait Storage: Send + Sync {
    /// Directory uploads are staged in before commit
    ///
    /// Must be on the same filesystem as the package store so commit is
    /// a rename.
    fn staging_dir(&self) -> &Path;

    /// Commit a package under a freshly generated id
    ///
    /// Checks `cancel` before the record becomes visible; a cancelled
    /// insert leaves nothing behind.
    fn insert(&self, package: NewPackage, cancel: &CancellationToken) -> Result<PackageRecord>;

    fn get(&self, id: &PackageId) -> Result<Option<PackageRecord>>;

    fn all(&self) -> Result<Vec<PackageRecord>>;

    fn by_identifier(&self, identifier: &str) -> Result<Vec<PackageRecord>>;

    /// Replace the comment; `false` when the id is unknown
    fn set_comment(&self, id: &PackageId, comment: &str) -> Result<bool>;

    /// Remove the record and its files; `false` when the id is unknown
    fn remove(&self, id: &PackageId) -> Result<bool>;

    /// Where the package bytes of `record` live
    fn package_path(&self, record: &PackageRecord) -> PathBuf;

    /// Where the icon of `record` lives, if it has one
    fn icon_path(&self, record: &PackageRecord) -> Option<PathBuf>;
}
