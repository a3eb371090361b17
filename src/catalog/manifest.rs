// src/catalog/manifest.rs

//! Over-the-air install manifest
//!
//! The device installer fetches this XML property list from the
//! `itms-services://` link and downloads the package named in it.

use crate::{Error, Result};
use serde::Serialize;
use std::io::{ErrorKind, Write};

const KIND_SOFTWARE_PACKAGE: &str = "software-package";
const KIND_DISPLAY_IMAGE: &str = "display-image";
const KIND_SOFTWARE: &str = "software";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub items: Vec<ManifestItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestItem {
    pub assets: Vec<Asset>,
    pub metadata: ManifestMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub kind: String,
    #[serde(rename = "needs-shine", skip_serializing_if = "Option::is_none")]
    pub needs_shine: Option<bool>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestMetadata {
    pub bundle_identifier: String,
    pub bundle_version: String,
    pub kind: String,
    pub title: String,
}

impl Manifest {
    /// Describe one installable package
    ///
    /// `icon_url` adds a display-image asset for the install prompt.
    pub fn new(
        package_url: String,
        icon_url: Option<String>,
        identifier: &str,
        version: &str,
        title: &str,
    ) -> Self {
        let mut assets = vec![Asset {
            kind: KIND_SOFTWARE_PACKAGE.to_string(),
            needs_shine: None,
            url: package_url,
        }];
        if let Some(url) = icon_url {
            assets.push(Asset {
                kind: KIND_DISPLAY_IMAGE.to_string(),
                needs_shine: Some(false),
                url,
            });
        }

        Self {
            items: vec![ManifestItem {
                assets,
                metadata: ManifestMetadata {
                    bundle_identifier: identifier.to_string(),
                    bundle_version: version.to_string(),
                    kind: KIND_SOFTWARE.to_string(),
                    title: title.to_string(),
                },
            }],
        }
    }

    /// Render as an XML property list
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        plist::to_writer_xml(&mut out, self)
            .map_err(|e| Error::Storage(format!("failed to encode manifest: {}", e)))?;
        Ok(out)
    }
}

/// Write a rendered manifest, verifying every byte was accepted
///
/// A writer that stops accepting bytes early yields `ShortWrite` rather
/// than a silently truncated document.
pub fn write_manifest<W: Write>(mut out: W, document: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < document.len() {
        match out.write(&document[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if written != document.len() {
        return Err(Error::ShortWrite {
            written,
            expected: document.len(),
        });
    }
    out.flush()?;
    Ok(())
}
