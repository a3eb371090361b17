// src/origin.rs

//! Externally visible origin of a request
//!
//! Generated manifests and download links must point at an address the
//! end user's device can reach, which is not necessarily the address the
//! server listens on (reverse proxies, iframes on another site). The
//! origin is recomputed for every request and never stored.

use std::fmt;
use url::Url;

/// Scheme used when no forwarded-protocol header is present
pub const DEFAULT_SCHEME: &str = "http";

/// A (scheme, host) pair, e.g. `https://apps.example.com:8443`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: String,
    /// Host, including an explicit port when one was given
    pub host: String,
}

impl Origin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    /// Derive the origin from request headers
    ///
    /// 1. A `referer` that parses as an absolute URL wins.
    /// 2. Otherwise `x-forwarded-proto` (default `http`) paired with the
    ///    request's own host.
    pub fn resolve(referer: Option<&str>, forwarded_proto: Option<&str>, host: &str) -> Self {
        if let Some(origin) = referer.and_then(Self::parse) {
            return origin;
        }

        let scheme = forwarded_proto
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCHEME);
        Self::new(scheme, host)
    }

    /// Parse the origin part of an absolute URL
    ///
    /// Returns `None` for relative references and for URLs without a host.
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        let host = url.host_str()?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Some(Self::new(url.scheme(), host))
    }

    /// Build an absolute URL for a server path (`path` starts with `/`)
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self, path)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}
