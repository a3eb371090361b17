// src/packages/mod.rs

//! Mobile package container support
//!
//! Both supported formats are zip archives with a format-specific
//! descriptor inside. Each format has a `Decoder` that turns random-access
//! bytes into a normalized `PackageMetadata` record. Only the identity
//! fields are mandatory; icons and localized labels degrade to explicit
//! "absent" / "unreadable" values instead of failing the decode.

pub mod android;
pub mod cgbi;
pub mod ipa;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use zip::result::ZipError;
use zip::ZipArchive;

pub use android::{ApkDecoder, Locale};
pub use ipa::IpaDecoder;

/// Errors raised while decoding a package container
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid archive: {0}")]
    Archive(String),

    #[error("missing archive entry: {0}")]
    MissingEntry(String),

    #[error("invalid property list: {0}")]
    Plist(String),

    #[error("invalid binary XML: {0}")]
    BinaryXml(String),

    #[error("invalid resource table: {0}")]
    ResourceTable(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid image: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode cancelled")]
    Cancelled,
}

impl From<zip::result::ZipError> for DecodeError {
    fn from(err: zip::result::ZipError) -> Self {
        DecodeError::Archive(err.to_string())
    }
}

/// Abort with `Cancelled` if the caller has gone away
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), DecodeError> {
    if cancel.is_cancelled() {
        Err(DecodeError::Cancelled)
    } else {
        Ok(())
    }
}

/// Read one archive member fully, refusing members larger than `limit`
pub(crate) fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>, DecodeError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(DecodeError::MissingEntry(name.to_string())),
        Err(e) => return Err(e.into()),
    };

    if entry.size() > limit {
        return Err(DecodeError::Archive(format!(
            "{} is too large ({} bytes, limit {})",
            name,
            entry.size(),
            limit
        )));
    }

    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.take(limit + 1).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Supported container formats
///
/// Serialized as the numeric tag the listing UI expects (0 = iOS,
/// 1 = Android).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageFormat {
    Ios,
    Android,
}

impl PackageFormat {
    /// Classify an upload by file extension (ASCII case-insensitive)
    ///
    /// # Examples
    /// ```
    /// use sideload::packages::PackageFormat;
    ///
    /// assert_eq!(PackageFormat::classify("App.ipa"), Some(PackageFormat::Ios));
    /// assert_eq!(PackageFormat::classify("app.apk"), Some(PackageFormat::Android));
    /// assert_eq!(PackageFormat::classify("app.zip"), None);
    /// ```
    pub fn classify(file_name: &str) -> Option<Self> {
        match Path::new(file_name).extension()?.to_str()? {
            ext if ext.eq_ignore_ascii_case("ipa") => Some(Self::Ios),
            ext if ext.eq_ignore_ascii_case("apk") => Some(Self::Android),
            _ => None,
        }
    }

    /// File extension used when storing and serving the package
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ios => "ipa",
            Self::Android => "apk",
        }
    }

    /// Human-readable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Ios => 0,
            Self::Android => 1,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Ios),
            1 => Some(Self::Android),
            _ => None,
        }
    }

    /// MIME type for download responses
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Ios => "application/octet-stream",
            Self::Android => "application/vnd.android.package-archive",
        }
    }
}

impl Serialize for PackageFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for PackageFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = u8::deserialize(deserializer)?;
        Self::from_u8(tag)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown package type {}", tag)))
    }
}

/// The extension of an upload's file name, as shown in rejection messages
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Normalized metadata extracted from a package
#[derive(Debug)]
pub struct PackageMetadata {
    pub format: PackageFormat,
    /// Display name from the descriptor (may be empty)
    pub name: String,
    /// Bundle identifier (iOS) or package name (Android)
    pub identifier: String,
    /// User-facing version string
    pub version: String,
    /// Build number (CFBundleVersion / versionCode)
    pub build: String,
    /// Distribution channel, when the package declares one
    pub channel: Option<String>,
    /// Size of the package file in bytes
    pub size: u64,
    /// `None`: no icon declared. `Some(Err)`: declared but unreadable.
    pub icon: Option<Result<Vec<u8>, DecodeError>>,
    /// `None`: no alternate-language label. `Some(Err)`: lookup failed.
    pub localized_label: Option<Result<String, DecodeError>>,
}

impl PackageMetadata {
    /// Name to catalog the package under
    ///
    /// Prefers a readable localized label, then the descriptor name, then
    /// the identifier.
    pub fn display_name(&self) -> &str {
        if let Some(Ok(label)) = &self.localized_label
            && !label.is_empty()
        {
            return label;
        }
        if !self.name.is_empty() {
            return &self.name;
        }
        &self.identifier
    }

    /// Icon bytes when one was successfully extracted
    pub fn icon_bytes(&self) -> Option<&[u8]> {
        match &self.icon {
            Some(Ok(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

/// Random-access byte source a decoder reads from
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Common interface for container decoders
pub trait Decoder: Send + Sync {
    /// The format this decoder understands
    fn format(&self) -> PackageFormat;

    /// Extract metadata from a package of `size` bytes
    ///
    /// Fails only when a mandatory field cannot be read. Checks `cancel`
    /// between stages and returns `DecodeError::Cancelled` once it fires.
    fn decode(
        &self,
        source: &mut dyn ReadSeek,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<PackageMetadata, DecodeError>;
}

/// Decoder tuning knobs
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Density tier requested when resolving Android icons
    pub icon_density: u16,
    /// Alternate-language label to look up in Android resources
    pub label_locale: Option<Locale>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            icon_density: android::DEFAULT_ICON_DENSITY,
            label_locale: Some(Locale::new("zh", "CN")),
        }
    }
}

/// One decoder per supported format, selected by `PackageFormat`
pub struct DecoderSet {
    ipa: IpaDecoder,
    apk: ApkDecoder,
}

impl DecoderSet {
    pub fn new(options: &DecoderOptions) -> Self {
        Self {
            ipa: IpaDecoder::new(),
            apk: ApkDecoder::new(options.icon_density, options.label_locale.clone()),
        }
    }

    pub fn for_format(&self, format: PackageFormat) -> &dyn Decoder {
        match format {
            PackageFormat::Ios => &self.ipa,
            PackageFormat::Android => &self.apk,
        }
    }
}

impl Default for DecoderSet {
    fn default() -> Self {
        Self::new(&DecoderOptions::default())
    }
}

/// Classify and decode a package file on disk
pub fn decode_file(path: &Path, decoders: &DecoderSet) -> crate::Result<PackageMetadata> {
    let file_name = path.to_string_lossy();
    let format = PackageFormat::classify(&file_name)
        .ok_or_else(|| crate::Error::UnsupportedFormat(extension_of(&file_name)))?;

    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let metadata = decoders
        .for_format(format)
        .decode(&mut file, size, &CancellationToken::new())?;
    Ok(metadata)
}
