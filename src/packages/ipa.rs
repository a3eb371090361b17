// src/packages/ipa.rs

//! iOS application archive (.ipa) decoder
//!
//! An IPA is a zip with the app bundle under `Payload/<Name>.app/`. The
//! bundle's `Info.plist` (XML or binary) carries the identity fields; icons
//! are PNG files in the bundle root named after `CFBundleIconFiles`.

use super::{
    DecodeError, Decoder, PackageFormat, PackageMetadata, ReadSeek, cgbi, check_cancelled,
    read_entry,
};
use plist::{Dictionary, Value};
use std::io::{Cursor, Read, Seek};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Largest Info.plist we are willing to load
const MAX_PLIST_SIZE: u64 = 4 * 1024 * 1024;
/// Largest icon file we are willing to load
const MAX_ICON_SIZE: u64 = 8 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct IpaDecoder;

impl IpaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for IpaDecoder {
    fn format(&self) -> PackageFormat {
        PackageFormat::Ios
    }

    fn decode(
        &self,
        source: &mut dyn ReadSeek,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<PackageMetadata, DecodeError> {
        check_cancelled(cancel)?;
        let mut archive = ZipArchive::new(source)?;

        let plist_path = find_info_plist(&archive)?;
        let app_dir = plist_path.trim_end_matches("Info.plist").to_string();
        debug!("Found app descriptor at {}", plist_path);

        let raw = read_entry(&mut archive, &plist_path, MAX_PLIST_SIZE)?;
        let info = parse_info_plist(&raw)?;
        check_cancelled(cancel)?;

        let identifier = string_field(&info, "CFBundleIdentifier")
            .ok_or(DecodeError::MissingField("CFBundleIdentifier"))?;
        let version = string_field(&info, "CFBundleShortVersionString")
            .or_else(|| string_field(&info, "CFBundleVersion"))
            .ok_or(DecodeError::MissingField("CFBundleShortVersionString"))?;
        let build = string_field(&info, "CFBundleVersion").unwrap_or_default();
        let name = string_field(&info, "CFBundleDisplayName")
            .or_else(|| string_field(&info, "CFBundleName"))
            .unwrap_or_default();
        let channel = string_field(&info, "Channel");

        let icon = extract_icon(&mut archive, &info, &app_dir);
        if let Some(Err(e)) = &icon {
            warn!("Icon for {} could not be read: {}", identifier, e);
        }
        check_cancelled(cancel)?;

        Ok(PackageMetadata {
            format: PackageFormat::Ios,
            name,
            identifier,
            version,
            build,
            channel,
            size,
            icon,
            localized_label: None,
        })
    }
}

/// Locate `Payload/<Name>.app/Info.plist`
///
/// Nested bundles (extensions, frameworks) also carry an Info.plist; only
/// the one directly inside the top-level app directory counts.
fn find_info_plist<R: Read + Seek>(archive: &ZipArchive<R>) -> Result<String, DecodeError> {
    let mut candidates: Vec<&str> = archive
        .file_names()
        .filter(|name| {
            let Some(rest) = name.strip_prefix("Payload/") else {
                return false;
            };
            let mut parts = rest.split('/');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(app), Some("Info.plist"), None) if app.ends_with(".app") && app.len() > 4
            )
        })
        .collect();
    candidates.sort_unstable();

    candidates
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| DecodeError::MissingEntry("Payload/*.app/Info.plist".to_string()))
}

fn parse_info_plist(raw: &[u8]) -> Result<Dictionary, DecodeError> {
    let value = Value::from_reader(Cursor::new(raw)).map_err(|e| DecodeError::Plist(e.to_string()))?;
    match value {
        Value::Dictionary(dict) => Ok(dict),
        _ => Err(DecodeError::Plist("root is not a dictionary".to_string())),
    }
}

fn string_field(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key)
        .and_then(Value::as_string)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Icon base names declared by the bundle, most specific first
fn declared_icon_names(info: &Dictionary) -> Vec<String> {
    let mut names = Vec::new();

    for icons_key in ["CFBundleIcons", "CFBundleIcons~ipad"] {
        let primary = info
            .get(icons_key)
            .and_then(Value::as_dictionary)
            .and_then(|icons| icons.get("CFBundlePrimaryIcon"))
            .and_then(Value::as_dictionary);

        if let Some(primary) = primary {
            if let Some(files) = primary.get("CFBundleIconFiles").and_then(Value::as_array) {
                names.extend(files.iter().filter_map(Value::as_string).map(str::to_string));
            }
            if let Some(name) = primary.get("CFBundleIconName").and_then(Value::as_string) {
                names.push(name.to_string());
            }
        }
    }

    if let Some(files) = info.get("CFBundleIconFiles").and_then(Value::as_array) {
        names.extend(files.iter().filter_map(Value::as_string).map(str::to_string));
    }
    if let Some(file) = info.get("CFBundleIconFile").and_then(Value::as_string) {
        names.push(file.to_string());
    }

    names
        .into_iter()
        .map(|n| {
            let lower = n.to_ascii_lowercase();
            if lower.ends_with(".png") {
                n[..n.len() - 4].to_string()
            } else {
                n
            }
        })
        .filter(|n| !n.is_empty())
        .collect()
}

/// Pick the largest PNG in the bundle root matching a declared icon name
///
/// Best-effort: `None` when the bundle declares no icon, `Some(Err)` when
/// it declares one that cannot be found or repaired.
fn extract_icon<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    info: &Dictionary,
    app_dir: &str,
) -> Option<Result<Vec<u8>, DecodeError>> {
    let names = declared_icon_names(info);
    if names.is_empty() {
        return None;
    }

    let mut best: Option<(String, u64)> = None;
    for i in 0..archive.len() {
        let Ok(entry) = archive.by_index(i) else {
            continue;
        };
        let Some(file_name) = entry.name().strip_prefix(app_dir) else {
            continue;
        };
        if file_name.contains('/') || !file_name.to_ascii_lowercase().ends_with(".png") {
            continue;
        }
        if !names.iter().any(|n| file_name.starts_with(n.as_str())) {
            continue;
        }
        if best.as_ref().is_none_or(|(_, size)| entry.size() > *size) {
            best = Some((entry.name().to_string(), entry.size()));
        }
    }

    let Some((path, _)) = best else {
        return Some(Err(DecodeError::MissingEntry(format!(
            "{}{}*.png",
            app_dir, names[0]
        ))));
    };

    debug!("Selected icon {}", path);
    Some(read_entry(archive, &path, MAX_ICON_SIZE).and_then(|raw| cgbi::normalize(&raw)))
}
