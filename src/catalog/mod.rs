// src/catalog/mod.rs

//! Catalog service
//!
//! Owns the id -> record mapping (through `Storage`) and implements the
//! operations the HTTP adapter exposes: list, find, search, add, edit,
//! delete and plist. Every caller-supplied id is validated here before
//! storage sees it. All methods block.

pub mod manifest;

use crate::id::PackageId;
use crate::origin::Origin;
use crate::packages::{DecodeError, DecoderSet, PackageFormat, extension_of};
use crate::storage::{NewPackage, PackageRecord, Storage};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use manifest::{Manifest, write_manifest};

/// Page size used when the request asks for none
pub const DEFAULT_PAGE_SIZE: usize = 10;
/// Largest page a single list request may ask for
pub const MAX_PAGE_SIZE: usize = 100;

/// An uploaded file waiting to be decoded and committed
///
/// Dropping it removes the staged bytes.
#[derive(Debug)]
pub struct StagedUpload {
    file_name: String,
    file: NamedTempFile,
}

impl StagedUpload {
    /// Create an empty staging file in `dir`
    pub fn create(file_name: impl Into<String>, dir: &Path) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(dir)?;
        Ok(Self {
            file_name: file_name.into(),
            file,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Writable handle for streaming the upload body
    pub fn as_file_mut(&mut self) -> &mut std::fs::File {
        self.file.as_file_mut()
    }
}

/// Response view of a record
///
/// Carries absolute URLs derived from the request origin; never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub format: PackageFormat,
    pub identifier: String,
    pub version: String,
    pub build: String,
    pub channel: String,
    pub comment: String,
    pub size: u64,
    pub date: DateTime<Utc>,
    pub icon: String,
    pub web_icon: String,
    pub pkg: String,
    pub plist: String,
    pub install: String,
    /// Newest upload of its identifier
    pub current: bool,
    /// Every upload sharing the identifier, newest first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ItemInfo>,
}

impl ItemInfo {
    fn new(record: &PackageRecord, origin: &Origin, current: bool) -> Self {
        let icon = if record.has_icon {
            icon_url(record, origin)
        } else {
            String::new()
        };
        let (plist, install) = match record.format {
            PackageFormat::Ios => {
                let plist = plist_url(record, origin);
                let install = install_link(&plist);
                (plist, install)
            }
            PackageFormat::Android => (String::new(), String::new()),
        };

        Self {
            id: record.id.to_string(),
            name: record.name.clone(),
            format: record.format,
            identifier: record.identifier.clone(),
            version: record.version.clone(),
            build: record.build.clone(),
            channel: record.channel.clone().unwrap_or_default(),
            comment: record.comment.clone(),
            size: record.size,
            date: record.created_at,
            web_icon: icon.clone(),
            icon,
            pkg: package_url(record, origin),
            plist,
            install,
            current,
            history: Vec::new(),
        }
    }

    /// Build the view of `record` with its history group
    ///
    /// `group` holds every record sharing the identifier, newest first.
    fn with_history(record: &PackageRecord, group: &[&PackageRecord], origin: &Origin) -> Self {
        let newest = group.first().map(|r| &r.id);
        let mut info = Self::new(record, origin, newest == Some(&record.id));
        info.history = group
            .iter()
            .map(|r| Self::new(r, origin, newest == Some(&r.id)))
            .collect();
        info
    }
}

fn package_url(record: &PackageRecord, origin: &Origin) -> String {
    origin.join(&format!("/pkg/{}.{}", record.id, record.format.extension()))
}

fn icon_url(record: &PackageRecord, origin: &Origin) -> String {
    origin.join(&format!("/icon/{}.png", record.id))
}

fn plist_url(record: &PackageRecord, origin: &Origin) -> String {
    origin.join(&format!("/plist/{}.plist", record.id))
}

/// `itms-services` link that makes iOS fetch the manifest
fn install_link(plist_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(plist_url.as_bytes()).collect();
    format!("itms-services://?action=download-manifest&url={}", encoded)
}

/// Records grouped by identifier, groups in order of their newest upload
struct Groups<'a> {
    order: Vec<&'a str>,
    members: HashMap<&'a str, Vec<&'a PackageRecord>>,
}

impl<'a> Groups<'a> {
    /// `records` must be newest first
    fn new(records: &'a [PackageRecord]) -> Self {
        let mut order = Vec::new();
        let mut members: HashMap<&str, Vec<&PackageRecord>> = HashMap::new();
        for record in records {
            let group = members.entry(record.identifier.as_str()).or_default();
            if group.is_empty() {
                order.push(record.identifier.as_str());
            }
            group.push(record);
        }
        Self { order, members }
    }

    fn of(&self, identifier: &str) -> &[&'a PackageRecord] {
        self.members.get(identifier).map(Vec::as_slice).unwrap_or_default()
    }
}

pub struct Catalog {
    storage: Arc<dyn Storage>,
    decoders: DecoderSet,
    delete_enabled: bool,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>, decoders: DecoderSet, delete_enabled: bool) -> Self {
        Self {
            storage,
            decoders,
            delete_enabled,
        }
    }

    /// Whether `delete` is permitted on this instance
    pub fn delete_enabled(&self) -> bool {
        self.delete_enabled
    }

    /// Prepare a staging file for an upload named `file_name`
    pub fn stage(&self, file_name: &str) -> Result<StagedUpload> {
        StagedUpload::create(file_name, self.storage.staging_dir())
    }

    /// One page of identifier groups, newest group first
    ///
    /// `page` is 1-based; values below 1 mean the first page. A `size`
    /// below 1 selects the default and larger sizes are capped. Pages past
    /// the end are empty.
    pub fn list(&self, origin: &Origin, page: i64, size: i64) -> Result<Vec<ItemInfo>> {
        let page = usize::try_from(page.max(1)).unwrap_or(usize::MAX);
        let size = match size {
            s if s < 1 => DEFAULT_PAGE_SIZE,
            s => usize::try_from(s).unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE),
        };
        let skip = (page - 1).saturating_mul(size);

        let records = self.storage.all()?;
        let groups = Groups::new(&records);
        Ok(groups
            .order
            .iter()
            .skip(skip)
            .take(size)
            .map(|identifier| {
                let group = groups.of(identifier);
                ItemInfo::with_history(group[0], group, origin)
            })
            .collect())
    }

    pub fn find(&self, id: &str, origin: &Origin) -> Result<ItemInfo> {
        let record = self.get(id)?;
        let group = self.storage.by_identifier(&record.identifier)?;
        let group: Vec<&PackageRecord> = group.iter().collect();
        Ok(ItemInfo::with_history(&record, &group, origin))
    }

    /// Records whose name or identifier contains `keyword`, ignoring case
    pub fn search(&self, keyword: &str, origin: &Origin) -> Result<Vec<ItemInfo>> {
        let needle = keyword.trim().to_lowercase();
        let records = self.storage.all()?;
        let groups = Groups::new(&records);

        Ok(records
            .iter()
            .filter(|r| {
                needle.is_empty()
                    || r.name.to_lowercase().contains(&needle)
                    || r.identifier.to_lowercase().contains(&needle)
            })
            .map(|r| ItemInfo::with_history(r, groups.of(&r.identifier), origin))
            .collect())
    }

    /// Classify, decode and commit an upload
    ///
    /// The staged file is consumed: it is either moved into the store or
    /// removed. Cancellation before commit leaves no record behind.
    pub fn add(&self, upload: StagedUpload, cancel: &CancellationToken) -> Result<PackageRecord> {
        let format = PackageFormat::classify(&upload.file_name)
            .ok_or_else(|| Error::UnsupportedFormat(extension_of(&upload.file_name)))?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let StagedUpload { file_name, file } = upload;
        let handle = file.reopen()?;
        let size = handle.metadata()?.len();
        let mut reader = BufReader::new(handle);

        let metadata = self
            .decoders
            .for_format(format)
            .decode(&mut reader, size, cancel)
            .map_err(|e| match e {
                DecodeError::Cancelled => Error::Cancelled,
                other => Error::Decode(other),
            })?;

        if let Some(Err(e)) = &metadata.icon {
            warn!("Icon of {} is unreadable: {}", file_name, e);
        }
        if let Some(Err(e)) = &metadata.localized_label {
            warn!("Localized label of {} is unreadable: {}", file_name, e);
        }

        let package = NewPackage {
            name: metadata.display_name().to_string(),
            identifier: metadata.identifier.clone(),
            version: metadata.version.clone(),
            build: metadata.build.clone(),
            channel: metadata.channel.clone(),
            format,
            size,
            icon: metadata.icon_bytes().map(<[u8]>::to_vec),
            file: file.into_temp_path(),
        };

        let record = self.storage.insert(package, cancel)?;
        info!(
            "Added {} package {} {} ({}) as {}",
            format.name(),
            record.identifier,
            record.version,
            record.build,
            record.id
        );
        Ok(record)
    }

    /// Replace the comment of a record
    pub fn edit(&self, id: &str, comment: &str) -> Result<()> {
        let id = PackageId::parse(id)?;
        if !self.storage.set_comment(&id, comment)? {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.delete_enabled {
            return Err(Error::PermissionDenied);
        }
        let id = PackageId::parse(id)?;
        if !self.storage.remove(&id)? {
            return Err(Error::NotFound(id.to_string()));
        }
        info!("Deleted package {}", id);
        Ok(())
    }

    /// Install manifest for an iOS record
    pub fn plist(&self, id: &str, origin: &Origin) -> Result<Vec<u8>> {
        let record = self.get(id)?;
        if record.format != PackageFormat::Ios {
            return Err(Error::NotFound(format!("manifest for {}", record.id)));
        }

        let manifest = Manifest::new(
            package_url(&record, origin),
            record.has_icon.then(|| icon_url(&record, origin)),
            &record.identifier,
            &record.version,
            &record.name,
        );
        manifest.to_xml()
    }

    /// Stored package file of a record
    pub fn package_file(&self, id: &str) -> Result<(PackageRecord, PathBuf)> {
        let record = self.get(id)?;
        let path = self.storage.package_path(&record);
        Ok((record, path))
    }

    /// Stored icon of a record
    pub fn icon_file(&self, id: &str) -> Result<PathBuf> {
        let record = self.get(id)?;
        self.storage
            .icon_path(&record)
            .ok_or_else(|| Error::NotFound(format!("icon for {}", record.id)))
    }

    fn get(&self, id: &str) -> Result<PackageRecord> {
        let id = PackageId::parse(id)?;
        self.storage
            .get(&id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
