// src/packages/android/mod.rs

//! Android `.apk` decoding
//!
//! Reads the compiled `AndroidManifest.xml` for identity fields and uses
//! `resources.arsc` to resolve the application label and launcher icon.

mod arsc;
mod axml;
mod chunk;
#[cfg(test)]
pub(crate) mod testutil;

pub use arsc::ResourceTable;
pub use axml::{XmlDocument, XmlElement};
pub use chunk::ResValue;

use super::{
    Decoder, DecodeError, PackageFormat, PackageMetadata, ReadSeek, check_cancelled, read_entry,
};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Density requested for launcher icons (beyond xxxhdpi, so the largest
/// bitmap wins)
pub const DEFAULT_ICON_DENSITY: u16 = 720;

const MANIFEST_PATH: &str = "AndroidManifest.xml";
const RESOURCES_PATH: &str = "resources.arsc";

const MAX_MANIFEST_SIZE: u64 = 8 * 1024 * 1024;
const MAX_TABLE_SIZE: u64 = 64 * 1024 * 1024;
const MAX_ICON_SIZE: u64 = 16 * 1024 * 1024;

// Framework attribute ids
const ATTR_LABEL: u32 = 0x0101_0001;
const ATTR_ICON: u32 = 0x0101_0002;
const ATTR_VERSION_CODE: u32 = 0x0101_021b;
const ATTR_VERSION_NAME: u32 = 0x0101_021c;

/// A language/region pair as stored in resource configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locale {
    pub language: [u8; 2],
    pub country: [u8; 2],
}

impl Locale {
    /// Build from two-letter codes; anything else is left unqualified
    pub fn new(language: &str, country: &str) -> Self {
        Self {
            language: two_letters(language),
            country: two_letters(country),
        }
    }

    /// Parse `zh-CN`, `zh_CN` or a bare `zh`
    pub fn parse(tag: &str) -> Option<Self> {
        let mut parts = tag.trim().split(['-', '_']);
        let language = parts.next().filter(|l| l.len() == 2)?;
        let country = match parts.next() {
            Some(c) if c.len() == 2 => c,
            Some(_) => return None,
            None => "",
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(&language.to_ascii_lowercase(), &country.to_ascii_uppercase()))
    }
}

fn two_letters(code: &str) -> [u8; 2] {
    match code.as_bytes() {
        [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => [*a, *b],
        _ => [0, 0],
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let language = String::from_utf8_lossy(&self.language);
        if self.country == [0, 0] {
            write!(f, "{}", language)
        } else {
            write!(f, "{}-{}", language, String::from_utf8_lossy(&self.country))
        }
    }
}

/// Decoder for Android packages
#[derive(Debug, Clone)]
pub struct ApkDecoder {
    icon_density: u16,
    label_locale: Option<Locale>,
}

impl Default for ApkDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_ICON_DENSITY, Some(Locale::new("zh", "CN")))
    }
}

impl ApkDecoder {
    pub fn new(icon_density: u16, label_locale: Option<Locale>) -> Self {
        Self {
            icon_density,
            label_locale,
        }
    }
}

impl Decoder for ApkDecoder {
    fn format(&self) -> PackageFormat {
        PackageFormat::Android
    }

    fn decode(
        &self,
        source: &mut dyn ReadSeek,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<PackageMetadata, DecodeError> {
        check_cancelled(cancel)?;
        let mut archive = ZipArchive::new(source)?;

        let manifest = XmlDocument::parse(&read_entry(&mut archive, MANIFEST_PATH, MAX_MANIFEST_SIZE)?)?;
        check_cancelled(cancel)?;

        // The table only feeds optional fields, so a broken one is
        // remembered rather than fatal.
        let table = read_entry(&mut archive, RESOURCES_PATH, MAX_TABLE_SIZE)
            .and_then(|raw| ResourceTable::parse(&raw));
        if let Err(e) = &table {
            warn!("Unable to read resource table: {}", e);
        }
        check_cancelled(cancel)?;

        let root = manifest
            .root()
            .filter(|e| e.name == "manifest")
            .ok_or_else(|| DecodeError::BinaryXml("document element is not <manifest>".to_string()))?;

        let identifier = root
            .attr("package")
            .and_then(ResValue::as_text)
            .filter(|s| !s.is_empty())
            .ok_or(DecodeError::MissingField("package"))?;

        let version = root
            .android_attr("versionName", ATTR_VERSION_NAME)
            .and_then(|v| resolve_text(v, table.as_ref().ok(), None))
            .filter(|s| !s.is_empty())
            .ok_or(DecodeError::MissingField("versionName"))?;

        let build = root
            .android_attr("versionCode", ATTR_VERSION_CODE)
            .and_then(|v| resolve_text(v, table.as_ref().ok(), None))
            .unwrap_or_default();

        let application = manifest.find("application", 1);
        let label = application.and_then(|app| app.android_attr("label", ATTR_LABEL));
        let name = label
            .and_then(|v| resolve_text(v, table.as_ref().ok(), None))
            .unwrap_or_default();

        let localized_label = match (&self.label_locale, label) {
            (Some(locale), Some(ResValue::Reference(id))) => match &table {
                Ok(table) => table.resolve_string(*id, Some(locale)).map(Ok),
                Err(e) => Some(Err(DecodeError::ResourceTable(e.to_string()))),
            },
            _ => None,
        };

        let icon = application
            .and_then(|app| app.android_attr("icon", ATTR_ICON))
            .map(|value| self.extract_icon(&mut archive, value, &table));

        debug!(
            "Decoded APK {} {} ({}), icon: {}",
            identifier,
            version,
            build,
            match &icon {
                None => "none",
                Some(Ok(_)) => "ok",
                Some(Err(_)) => "unreadable",
            }
        );

        Ok(PackageMetadata {
            format: PackageFormat::Android,
            name,
            identifier,
            version,
            build,
            channel: None,
            size,
            icon,
            localized_label,
        })
    }
}

impl ApkDecoder {
    /// Resolve the declared icon to the best bitmap in the archive
    ///
    /// Adaptive icons (XML drawables) are skipped in favour of a bitmap
    /// variant of the same resource.
    fn extract_icon<R: std::io::Read + std::io::Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        value: &ResValue,
        table: &Result<ResourceTable, DecodeError>,
    ) -> Result<Vec<u8>, DecodeError> {
        let paths = match value {
            ResValue::String(path) => vec![path.clone()],
            ResValue::Reference(id) => match table {
                Ok(table) => table.resolve_files(*id, self.icon_density),
                Err(e) => return Err(DecodeError::ResourceTable(e.to_string())),
            },
            other => {
                return Err(DecodeError::BinaryXml(format!(
                    "unexpected icon attribute value {:?}",
                    other
                )));
            }
        };

        for path in paths.iter().filter(|p| is_bitmap(p)) {
            match read_entry(archive, path, MAX_ICON_SIZE) {
                Ok(bytes) => return Ok(bytes),
                Err(DecodeError::MissingEntry(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(DecodeError::MissingEntry(format!(
            "no bitmap launcher icon among {} candidate(s)",
            paths.len()
        )))
    }
}

fn is_bitmap(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    [".png", ".webp", ".jpg", ".jpeg"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Text of a manifest attribute, following resource references
fn resolve_text(value: &ResValue, table: Option<&ResourceTable>, locale: Option<&Locale>) -> Option<String> {
    match value {
        ResValue::Reference(id) => table?.resolve_string(*id, locale),
        other => other.as_text(),
    }
}
