// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Fluxgate - Failover write client for time-series clusters
//!
//! Delivers pre-serialized batches of time-series points to one of several
//! configured endpoints of the same logical cluster. Endpoints are tried in a
//! fresh random order on every write; the first successful delivery wins. A
//! missing remote database is recreated opportunistically, and a batch the
//! remote schema can never accept is dropped instead of retried forever.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxgate::{Batch, ClusterWriter, WriterConfig};
//!
//! # async fn run() -> Result<(), fluxgate::Error> {
//! let mut config = WriterConfig::default();
//! config.urls = vec!["http://db-a:8086".into(), "http://db-b:8086".into()];
//! config.database = "telegraf".into();
//!
//! let mut writer = ClusterWriter::connect(&config).await?;
//!
//! // Payload comes from an external serializer; fluxgate never inspects it.
//! let payload = b"cpu,host=a usage=0.5 1700000000000000000\n";
//! writer.write(Batch::new(payload, 1)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                        ClusterWriter                             |
//! |   random visiting order | failover loop | recovery decisions     |
//! +------------------------------------------------------------------+
//! |                     WriteClient (trait)                          |
//! |        Endpoint::Http (reqwest)  |  Endpoint::Udp (datagram)     |
//! +------------------------------------------------------------------+
//! |                   classify_failure (pluggable)                   |
//! |   database not found | field type conflict | everything else     |
//! +------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ClusterWriter`] | The write orchestrator; owns the endpoint registry |
//! | [`WriterConfig`] | Setup-time configuration (URLs, auth, TLS, timeouts) |
//! | [`Batch`] | Opaque serialized payload plus its logical point count |
//! | [`WriteClient`] | Per-endpoint transport capability set |
//! | [`WriteError`] | Classified per-endpoint write failure |

pub mod client;
pub mod config;
pub mod writer;

pub use client::{
    classify_failure, Classifier, Endpoint, FailureKind, HttpEndpoint, UdpEndpoint, WriteClient,
    WriteError,
};
pub use config::{ContentEncoding, TlsConfig, WriterConfig, DEFAULT_URL};
pub use writer::ClusterWriter;

/// Convenience alias for fluxgate results.
pub type Result<T> = std::result::Result<T, Error>;

/// A single write unit: an opaque serialized payload plus its logical size.
///
/// Produced by an external serializer. Fluxgate never inspects or mutates the
/// payload; the point count exists only for logging.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    payload: &'a [u8],
    points: usize,
}

impl<'a> Batch<'a> {
    /// Wraps a serialized payload and its point count.
    pub fn new(payload: &'a [u8], points: usize) -> Self {
        Self { payload, points }
    }

    /// The serialized bytes to put on the wire.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Number of points the payload encodes.
    pub fn points(&self) -> usize {
        self.points
    }
}

/// Errors returned by fluxgate setup and write operations.
///
/// Per-endpoint write failures are classified internally (see
/// [`client::WriteError`]); this enum is what callers of [`ClusterWriter`]
/// observe.
#[derive(Debug)]
pub enum Error {
    /// A configured destination URL could not be parsed.
    InvalidUrl { url: String, reason: String },
    /// A configured destination URL uses a scheme fluxgate cannot speak.
    UnsupportedScheme { url: String, scheme: String },
    /// The HTTP proxy URL could not be parsed.
    InvalidProxy { url: String, reason: String },
    /// TLS material (CA, client cert or key) could not be loaded.
    Tls(String),
    /// The underlying HTTP client could not be constructed.
    HttpClient { url: String, reason: String },
    /// The datagram socket could not be bound or connected.
    Socket { url: String, reason: String },
    /// The endpoint registry is empty; nothing to write to.
    NoEndpoints,
    /// Every endpoint in the visiting order failed for this call.
    AllEndpointsFailed { attempts: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidUrl { url, reason } => {
                write!(f, "invalid endpoint URL [{}]: {}", url, reason)
            }
            Error::UnsupportedScheme { url, scheme } => {
                write!(f, "unsupported scheme {:?} in endpoint URL [{}]", scheme, url)
            }
            Error::InvalidProxy { url, reason } => {
                write!(f, "invalid proxy URL [{}]: {}", url, reason)
            }
            Error::Tls(msg) => write!(f, "TLS configuration error: {}", msg),
            Error::HttpClient { url, reason } => {
                write!(f, "failed to create HTTP client for [{}]: {}", url, reason)
            }
            Error::Socket { url, reason } => {
                write!(f, "failed to open datagram socket for [{}]: {}", url, reason)
            }
            Error::NoEndpoints => write!(f, "no endpoints configured"),
            Error::AllEndpointsFailed { attempts } => {
                write!(f, "could not write batch to any of {} endpoints", attempts)
            }
        }
    }
}

impl std::error::Error for Error {}
