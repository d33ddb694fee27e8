// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer configuration.
//!
//! The configuration is immutable once a [`crate::ClusterWriter`] has been
//! built from it. All fields have serde defaults so partial configs
//! deserialize cleanly from the host agent's config format.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Endpoint used when no URL is configured at all.
pub const DEFAULT_URL: &str = "http://localhost:8086";

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default maximum datagram payload size in bytes.
pub const DEFAULT_UDP_PAYLOAD: usize = 512;

/// Content encoding applied to HTTP write bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// Send the payload as-is.
    #[default]
    Identity,
    /// Compress each request body with gzip.
    Gzip,
}

/// TLS options for HTTPS endpoints.
///
/// Paths point at PEM files. `insecure_skip_verify` disables chain and host
/// verification and must never be used outside test environments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to a CA certificate bundle.
    pub ca: Option<PathBuf>,
    /// Path to the client certificate.
    pub cert: Option<PathBuf>,
    /// Path to the client private key.
    pub key: Option<PathBuf>,
    /// Skip chain and host verification.
    pub insecure_skip_verify: bool,
}

/// Configuration for a [`crate::ClusterWriter`].
///
/// `urls` lists the endpoints of one logical cluster; `url` is the legacy
/// single-endpoint field and is merged in by [`WriterConfig::endpoint_urls`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Legacy single-URL field, kept for backwards compatibility.
    pub url: String,
    /// Destination URLs. Schemes: `http`, `https`, `udp`.
    pub urls: Vec<String>,
    /// Target database name.
    pub database: String,
    /// Retention policy passed through verbatim; empty means server default.
    pub retention_policy: String,
    /// Write consistency level passed through verbatim (any/one/quorum/all).
    pub consistency: String,
    /// Username for basic auth.
    pub username: Option<String>,
    /// Password for basic auth.
    pub password: Option<String>,
    /// Bearer token; takes precedence over basic auth when set.
    pub jwt_token: Option<String>,
    /// User-Agent header. Empty selects the crate default.
    pub user_agent: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum datagram payload size for `udp` endpoints.
    pub udp_payload: usize,
    /// HTTP proxy URL.
    pub http_proxy: Option<String>,
    /// Extra headers sent with every HTTP request.
    pub http_headers: HashMap<String, String>,
    /// Content encoding for HTTP write bodies.
    pub content_encoding: ContentEncoding,
    /// Disable automatic database creation, both at connect and at write time.
    pub skip_database_creation: bool,
    /// TLS options for HTTPS endpoints.
    pub tls: TlsConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            urls: Vec::new(),
            database: "metrics".to_string(),
            retention_policy: String::new(),
            consistency: String::new(),
            username: None,
            password: None,
            jwt_token: None,
            user_agent: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            udp_payload: DEFAULT_UDP_PAYLOAD,
            http_proxy: None,
            http_headers: HashMap::new(),
            content_encoding: ContentEncoding::Identity,
            skip_database_creation: false,
            tls: TlsConfig::default(),
        }
    }
}

impl WriterConfig {
    /// Merges `urls` with the legacy `url` field.
    ///
    /// Falls back to exactly one default local endpoint when neither field is
    /// set, so setup never produces a silent no-op writer.
    pub fn endpoint_urls(&self) -> Vec<String> {
        let mut urls = self.urls.clone();
        if !self.url.is_empty() {
            urls.push(self.url.clone());
        }
        if urls.is_empty() {
            urls.push(DEFAULT_URL.to_string());
        }
        urls
    }

    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// User-Agent header value, defaulting to `fluxgate/<version>`.
    pub fn user_agent(&self) -> String {
        if self.user_agent.is_empty() {
            format!("fluxgate/{}", env!("CARGO_PKG_VERSION"))
        } else {
            self.user_agent.clone()
        }
    }
}
