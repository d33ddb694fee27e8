// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-endpoint transport clients.
//!
//! Two variants sit behind the [`WriteClient`] trait:
//!
//! ```text
//! WriteClient Trait
//! +-- HttpEndpoint  (request/response, can provision the remote database)
//! +-- UdpEndpoint   (fire-and-forget datagrams, provisioning is a no-op)
//! ```
//!
//! [`Endpoint`] dispatches between them so the orchestrator holds one
//! homogeneous registry. Failure classification lives here too: the transport
//! maps a raw failure into a [`WriteError`] and the orchestrator only ever
//! reasons about its [`FailureKind`].

pub mod http;
pub mod udp;

pub use http::HttpEndpoint;
pub use udp::UdpEndpoint;

use crate::Batch;

/// What a failed write attempt means for the failover loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The remote database does not exist; provisioning may fix the next call.
    DatabaseNotFound,
    /// The batch conflicts with the remote schema and can never be accepted.
    IncompatibleBatch,
    /// Anything else: connect failure, timeout, 5xx, unreadable response.
    Transient,
}

/// A classified write failure from one endpoint.
#[derive(Debug, Clone)]
pub struct WriteError {
    /// What the failure means for the failover loop.
    pub kind: FailureKind,
    /// Human-readable description, typically the remote error body.
    pub message: String,
    /// Transport status code, where the transport has one.
    pub status: Option<u16>,
}

impl WriteError {
    /// A `Transient` failure with no status code.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            status: None,
        }
    }
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} (status {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for WriteError {}

/// Classifier function mapping a response status and body to a [`FailureKind`].
///
/// Kept as a plain function pointer so the matching strings can be revisited
/// without touching the orchestrator or the transport clients.
pub type Classifier = fn(Option<u16>, &str) -> FailureKind;

/// Default classifier, matching the remote's error text.
///
/// The remote reports errors as free text; these substrings are the stable
/// part of its responses. Status codes are carried in [`WriteError`] for
/// logging but do not drive classification.
pub fn classify_failure(_status: Option<u16>, body: &str) -> FailureKind {
    if body.contains("database not found") {
        FailureKind::DatabaseNotFound
    } else if body.contains("field type conflict") {
        FailureKind::IncompatibleBatch
    } else {
        FailureKind::Transient
    }
}

/// Capability set of one configured endpoint.
///
/// Implementations own their transport state (connection pool or datagram
/// socket), created once at connect time and reused across writes.
pub trait WriteClient: Send + Sync {
    /// Pushes one serialized batch to the endpoint.
    fn write(
        &self,
        batch: Batch<'_>,
    ) -> impl std::future::Future<Output = Result<(), WriteError>> + Send;

    /// Issues the administrative create-database command.
    ///
    /// Idempotent: an already-existing database counts as success. Datagram
    /// endpoints have no provisioning operation and report success without
    /// doing anything.
    fn create_database(&self) -> impl std::future::Future<Output = Result<(), WriteError>> + Send;

    /// The endpoint address, for log messages.
    fn url(&self) -> &str;

    /// The target database name, for log messages.
    fn database(&self) -> &str;
}

/// One configured endpoint of the cluster.
pub enum Endpoint {
    /// Request/response endpoint (`http` / `https`).
    Http(HttpEndpoint),
    /// Fire-and-forget datagram endpoint (`udp`).
    Udp(UdpEndpoint),
}

impl WriteClient for Endpoint {
    async fn write(&self, batch: Batch<'_>) -> Result<(), WriteError> {
        match self {
            Endpoint::Http(c) => c.write(batch).await,
            Endpoint::Udp(c) => c.write(batch).await,
        }
    }

    async fn create_database(&self) -> Result<(), WriteError> {
        match self {
            Endpoint::Http(c) => c.create_database().await,
            Endpoint::Udp(c) => c.create_database().await,
        }
    }

    fn url(&self) -> &str {
        match self {
            Endpoint::Http(c) => c.url(),
            Endpoint::Udp(c) => c.url(),
        }
    }

    fn database(&self) -> &str {
        match self {
            Endpoint::Http(c) => c.database(),
            Endpoint::Udp(c) => c.database(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_database_not_found() {
        assert_eq!(
            classify_failure(Some(404), r#"database not found: "telegraf""#),
            FailureKind::DatabaseNotFound
        );
    }

    #[test]
    fn test_classify_field_type_conflict() {
        assert_eq!(
            classify_failure(
                Some(400),
                "partial write: field type conflict: input field \"value\" is type float"
            ),
            FailureKind::IncompatibleBatch
        );
    }

    #[test]
    fn test_classify_everything_else_is_transient() {
        assert_eq!(classify_failure(Some(500), "timeout"), FailureKind::Transient);
        assert_eq!(classify_failure(None, "connection refused"), FailureKind::Transient);
        assert_eq!(classify_failure(Some(503), ""), FailureKind::Transient);
    }

    #[test]
    fn test_classify_ignores_status_code() {
        // Matching is on body text by design; a 200-shaped status with a
        // "database not found" body still classifies as DatabaseNotFound.
        assert_eq!(
            classify_failure(Some(200), "database not found"),
            FailureKind::DatabaseNotFound
        );
    }

    #[test]
    fn test_write_error_display() {
        let err = WriteError {
            kind: FailureKind::Transient,
            message: "internal error".to_string(),
            status: Some(500),
        };
        assert_eq!(err.to_string(), "internal error (status 500)");
        assert_eq!(WriteError::transient("boom").to_string(), "boom");
    }
}
