// src/lib.rs

//! Sideload
//!
//! Internal app-distribution store for iOS (`.ipa`) and Android (`.apk`)
//! packages with over-the-air install manifests.
//!
//! # Architecture
//!
//! - Packages: container decoders producing normalized metadata
//! - Storage: SQLite metadata plus package and icon files on disk
//! - Catalog: list, find, search, add, edit, delete and manifest generation
//! - Server: JSON API and file endpoints over HTTP (feature `server`)

pub mod catalog;
mod error;
pub mod id;
pub mod origin;
pub mod packages;
pub mod storage;

#[cfg(feature = "server")]
pub mod server;

pub use catalog::{Catalog, ItemInfo, StagedUpload};
pub use error::{Error, Result};
pub use id::PackageId;
pub use origin::Origin;
pub use packages::{DecodeError, PackageFormat, PackageMetadata};
pub use storage::{PackageRecord, SqliteStorage, Storage};
