// src/server/config.rs
//! Configuration file parsing for the sideload server
//!
//! Supports TOML configuration files with the following sections:
//! - [server] - Bind address, public URL, delete capability, upload limit
//! - [storage] - Root directory for metadata, packages and icons
//! - [decoder] - Android icon density and label locale

use crate::origin::Origin;
use crate::packages::{DecoderOptions, Locale};
use crate::server::ServerConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct SideloadConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub decoder: DecoderSection,
}

/// Server configuration section
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Fixed external URL; when unset the origin is derived per request
    #[serde(default)]
    pub public_url: Option<String>,

    /// Allow `POST /api/delete`
    #[serde(default)]
    pub enable_delete: bool,

    /// Largest accepted upload (e.g., "512MB", "2GB")
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            enable_delete: false,
            max_upload_size: default_max_upload_size(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_upload_size() -> String {
    "2GB".to_string()
}

/// Storage configuration section
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    /// Root directory for all storage
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/sideload")
}

/// Package decoder section
#[derive(Debug, Deserialize)]
pub struct DecoderSection {
    /// Density requested when resolving Android launcher icons
    #[serde(default = "default_icon_density")]
    pub icon_density: u16,

    /// Alternate-language Android label (e.g., "zh-CN"); empty disables
    #[serde(default = "default_label_locale")]
    pub label_locale: String,
}

impl Default for DecoderSection {
    fn default() -> Self {
        Self {
            icon_density: default_icon_density(),
            label_locale: default_label_locale(),
        }
    }
}

fn default_icon_density() -> u16 {
    crate::packages::android::DEFAULT_ICON_DENSITY
}

fn default_label_locale() -> String {
    "zh-CN".to_string()
}

impl SideloadConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SideloadConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server.bind address: {}", self.server.bind))?;

        if let Some(url) = &self.server.public_url
            && Origin::parse(url).is_none()
        {
            anyhow::bail!("server.public_url must be an absolute URL, got '{}'", url);
        }

        let max_upload = parse_size(&self.server.max_upload_size).with_context(|| {
            format!("Invalid server.max_upload_size: {}", self.server.max_upload_size)
        })?;
        if max_upload == 0 {
            anyhow::bail!("server.max_upload_size must be greater than zero");
        }

        if self.decoder.icon_density == 0 {
            anyhow::bail!("decoder.icon_density must be greater than zero");
        }

        self.label_locale()?;
        Ok(())
    }

    fn label_locale(&self) -> Result<Option<Locale>> {
        let tag = self.decoder.label_locale.trim();
        if tag.is_empty() {
            return Ok(None);
        }
        Locale::parse(tag)
            .map(Some)
            .with_context(|| format!("Invalid decoder.label_locale: {}", tag))
    }

    /// Convert to the internal ServerConfig structure
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let bind_addr = self.server.bind.parse()?;
        let public_origin = match &self.server.public_url {
            Some(url) => Some(
                Origin::parse(url).with_context(|| format!("Invalid server.public_url: {}", url))?,
            ),
            None => None,
        };
        let max_upload_size = usize::try_from(parse_size(&self.server.max_upload_size)?)
            .context("server.max_upload_size does not fit in memory addressing")?;

        Ok(ServerConfig {
            bind_addr,
            storage_root: self.storage.root.clone(),
            public_origin,
            enable_delete: self.server.enable_delete,
            max_upload_size,
            decoder: DecoderOptions {
                icon_density: self.decoder.icon_density,
                label_locale: self.label_locale()?,
            },
        })
    }
}

/// Parse a human-readable size string (e.g., "2GB", "512MB")
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("TB") {
        (n, 1024u64 * 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1024u64 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024u64 * 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1024u64)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1u64)
    } else {
        (s.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size number: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        anyhow::bail!("Invalid size: {}", s);
    }

    Ok((num * multiplier as f64) as u64)
}
