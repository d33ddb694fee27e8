// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response endpoint over HTTP(S).
//!
//! Writes go to `POST <base>/write?db=..&rp=..&consistency=..` with the
//! serialized batch as the body, optionally gzip-compressed. Provisioning
//! issues `CREATE DATABASE "<name>"` against `POST <base>/query`. Non-2xx
//! responses are decoded (the remote wraps error text as `{"error": "..."}`)
//! and classified before they reach the orchestrator.

use std::io::Write as _;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Certificate, Client, Identity, Proxy, StatusCode, Url};
use serde::Deserialize;

use super::{classify_failure, Classifier, WriteError};
use crate::config::{ContentEncoding, TlsConfig, WriterConfig};
use crate::{Batch, Error};

/// Longest slice of a response body kept in error messages and logs.
const MAX_BODY_IN_ERROR: usize = 256;

/// Credentials attached to every request.
enum Credentials {
    None,
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer(String),
}

/// Error body shape of the remote write endpoint.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Result rows of the remote query endpoint.
#[derive(Deserialize)]
struct QueryBody {
    #[serde(default)]
    results: Vec<QueryResult>,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    error: Option<String>,
}

/// One request/response endpoint of the cluster.
///
/// Owns a pooled [`reqwest::Client`]; connection reuse across write calls is
/// internal to it. Safe under the orchestrator's sequential call pattern.
pub struct HttpEndpoint {
    client: Client,
    url: String,
    write_url: Url,
    query_url: Url,
    database: String,
    timeout: Duration,
    credentials: Credentials,
    content_encoding: ContentEncoding,
    classifier: Classifier,
}

impl HttpEndpoint {
    /// Builds an endpoint for `url` from the writer configuration.
    ///
    /// Fails on unloadable TLS material, a malformed proxy URL, or header
    /// names/values the HTTP layer rejects.
    pub fn new(url: Url, config: &WriterConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent())
            .use_rustls_tls();

        builder = apply_tls(builder, &config.tls)?;

        if let Some(proxy) = &config.http_proxy {
            let proxy = Proxy::all(proxy.as_str()).map_err(|e| Error::InvalidProxy {
                url: proxy.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        if !config.http_headers.is_empty() {
            builder = builder.default_headers(header_map(&config.http_headers, &url)?);
        }

        let client = builder.build().map_err(|e| Error::HttpClient {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let credentials = if let Some(token) = &config.jwt_token {
            Credentials::Bearer(token.clone())
        } else if let Some(username) = &config.username {
            Credentials::Basic {
                username: username.clone(),
                password: config.password.clone(),
            }
        } else {
            Credentials::None
        };

        let write_url = write_url(&url, config)?;
        let query_url = join_path(&url, "query")?;

        Ok(Self {
            client,
            url: url.to_string(),
            write_url,
            query_url,
            database: config.database.clone(),
            timeout: config.timeout(),
            credentials,
            content_encoding: config.content_encoding,
            classifier: classify_failure,
        })
    }

    /// Replaces the failure classifier. Intended for deployments whose remote
    /// reports errors with different wording.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sends one serialized batch to the write endpoint.
    pub async fn write(&self, batch: Batch<'_>) -> Result<(), WriteError> {
        let mut request = self
            .client
            .post(self.write_url.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8");

        request = match self.content_encoding {
            ContentEncoding::Identity => request.body(batch.payload().to_vec()),
            ContentEncoding::Gzip => {
                let body = gzip(batch.payload())?;
                request.header(CONTENT_ENCODING, "gzip").body(body)
            }
        };

        let response = self
            .apply_credentials(request)
            .send()
            .await
            .map_err(|e| WriteError::transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            log::debug!(
                "[http] wrote {} points ({} bytes) to [{}]",
                batch.points(),
                batch.payload().len(),
                self.url
            );
            return Ok(());
        }

        Err(self.classified(status, response.text().await.unwrap_or_default()))
    }

    /// Issues `CREATE DATABASE "<name>"` against the query endpoint.
    ///
    /// An already-existing database or a 403 (managed clusters that deny
    /// admin commands) counts as success.
    pub async fn create_database(&self) -> Result<(), WriteError> {
        let statement = format!(r#"CREATE DATABASE "{}""#, escape_identifier(&self.database));

        let request = self
            .client
            .post(self.query_url.clone())
            .timeout(self.timeout)
            .query(&[("q", statement.as_str())]);

        let response = self
            .apply_credentials(request)
            .send()
            .await
            .map_err(|e| WriteError::transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            log::debug!(
                "[http] create database {:?} on [{}] forbidden, assuming it is managed remotely",
                self.database,
                self.url
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            // 200 responses can still carry a per-statement error.
            if let Ok(query) = serde_json::from_str::<QueryBody>(&body) {
                if let Some(error) = query.results.into_iter().find_map(|r| r.error) {
                    if !error.contains("already exists") {
                        return Err(WriteError {
                            kind: (self.classifier)(Some(status.as_u16()), &error),
                            message: truncate(&error),
                            status: Some(status.as_u16()),
                        });
                    }
                }
            }
            return Ok(());
        }

        Err(self.classified(status, body))
    }

    /// The endpoint address, for log messages.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The target database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn apply_credentials(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::None => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, password.as_deref())
            }
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }

    /// Maps a non-2xx response to a classified [`WriteError`].
    fn classified(&self, status: StatusCode, body: String) -> WriteError {
        let description = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) => body,
        };
        let description = if description.trim().is_empty() {
            status.to_string()
        } else {
            description
        };
        WriteError {
            kind: (self.classifier)(Some(status.as_u16()), &description),
            message: truncate(&description),
            status: Some(status.as_u16()),
        }
    }
}

/// Appends `segment` to the URL path, keeping any base path prefix.
fn join_path(url: &Url, segment: &str) -> Result<Url, Error> {
    let mut joined = url.clone();
    joined
        .path_segments_mut()
        .map_err(|()| Error::InvalidUrl {
            url: url.to_string(),
            reason: "cannot-be-a-base URL".to_string(),
        })?
        .pop_if_empty()
        .push(segment);
    Ok(joined)
}

/// Precomputes the write URL with its db/rp/consistency query parameters.
fn write_url(url: &Url, config: &WriterConfig) -> Result<Url, Error> {
    let mut write_url = join_path(url, "write")?;
    {
        let mut pairs = write_url.query_pairs_mut();
        pairs.append_pair("db", &config.database);
        if !config.retention_policy.is_empty() {
            pairs.append_pair("rp", &config.retention_policy);
        }
        if !config.consistency.is_empty() {
            pairs.append_pair("consistency", &config.consistency);
        }
    }
    Ok(write_url)
}

fn header_map(headers: &std::collections::HashMap<String, String>, url: &Url) -> Result<HeaderMap, Error> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::HttpClient {
            url: url.to_string(),
            reason: format!("invalid header name {:?}: {}", name, e),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| Error::HttpClient {
            url: url.to_string(),
            reason: format!("invalid value for header {:?}: {}", name, e),
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::ClientBuilder, Error> {
    if let Some(ca) = &tls.ca {
        let pem = std::fs::read(ca)
            .map_err(|e| Error::Tls(format!("reading CA file {}: {}", ca.display(), e)))?;
        let cert = Certificate::from_pem(&pem)
            .map_err(|e| Error::Tls(format!("parsing CA file {}: {}", ca.display(), e)))?;
        builder = builder.add_root_certificate(cert);
    }

    if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
        // rustls wants certificate and key concatenated in one PEM bundle.
        let mut pem = std::fs::read(cert)
            .map_err(|e| Error::Tls(format!("reading cert file {}: {}", cert.display(), e)))?;
        pem.push(b'\n');
        pem.extend(
            std::fs::read(key)
                .map_err(|e| Error::Tls(format!("reading key file {}: {}", key.display(), e)))?,
        );
        let identity = Identity::from_pem(&pem)
            .map_err(|e| Error::Tls(format!("parsing client identity: {}", e)))?;
        builder = builder.identity(identity);
    }

    if tls.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder)
}

/// Gzip-compresses a write body.
fn gzip(payload: &[u8]) -> Result<Vec<u8>, WriteError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .and_then(|()| encoder.finish())
        .map_err(|e| WriteError::transient(format!("gzip encoding failed: {}", e)))
}

/// Escapes a database name for use inside a double-quoted identifier.
///
/// Backslash, double quote, and newline would otherwise terminate the quoted
/// string early or smuggle in a second statement.
pub(crate) fn escape_identifier(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_BODY_IN_ERROR {
        return text.to_string();
    }
    text.chars().take(MAX_BODY_IN_ERROR).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use super::*;

    fn endpoint(config: &WriterConfig) -> HttpEndpoint {
        let url = Url::parse("http://db-a:8086").unwrap();
        HttpEndpoint::new(url, config).unwrap()
    }

    #[test]
    fn test_write_url_carries_query_parameters() {
        let config = WriterConfig {
            database: "telegraf".to_string(),
            retention_policy: "two_weeks".to_string(),
            consistency: "quorum".to_string(),
            ..WriterConfig::default()
        };
        let ep = endpoint(&config);
        assert_eq!(ep.write_url.path(), "/write");
        let query = ep.write_url.query().unwrap();
        assert!(query.contains("db=telegraf"));
        assert!(query.contains("rp=two_weeks"));
        assert!(query.contains("consistency=quorum"));
    }

    #[test]
    fn test_write_url_omits_empty_rp_and_consistency() {
        let ep = endpoint(&WriterConfig::default());
        let query = ep.write_url.query().unwrap();
        assert!(query.contains("db=metrics"));
        assert!(!query.contains("rp="));
        assert!(!query.contains("consistency="));
    }

    #[test]
    fn test_join_path_keeps_base_prefix() {
        let base = Url::parse("http://proxy:8086/influx").unwrap();
        let joined = join_path(&base, "write").unwrap();
        assert_eq!(joined.path(), "/influx/write");
    }

    #[test]
    fn test_query_url() {
        let ep = endpoint(&WriterConfig::default());
        assert_eq!(ep.query_url.path(), "/query");
    }

    #[test]
    fn test_invalid_header_rejected_at_setup() {
        let mut config = WriterConfig::default();
        config
            .http_headers
            .insert("X-Tenant\n".to_string(), "acme".to_string());
        let url = Url::parse("http://db-a:8086").unwrap();
        match HttpEndpoint::new(url, &config) {
            Err(Error::HttpClient { url, .. }) => assert!(url.contains("db-a")),
            other => panic!("expected HttpClient error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_classified_decodes_json_error_body() {
        let ep = endpoint(&WriterConfig::default());
        let err = ep.classified(
            StatusCode::NOT_FOUND,
            r#"{"error": "database not found: \"metrics\""}"#.to_string(),
        );
        assert_eq!(err.kind, super::super::FailureKind::DatabaseNotFound);
        assert_eq!(err.status, Some(404));
        assert!(err.message.contains("database not found"));
    }

    #[test]
    fn test_classified_falls_back_to_raw_body() {
        let ep = endpoint(&WriterConfig::default());
        let err = ep.classified(StatusCode::BAD_GATEWAY, "upstream unreachable".to_string());
        assert_eq!(err.kind, super::super::FailureKind::Transient);
        assert_eq!(err.message, "upstream unreachable");
    }

    #[test]
    fn test_classified_empty_body_uses_status() {
        let ep = endpoint(&WriterConfig::default());
        let err = ep.classified(StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert!(err.message.contains("503"));
    }

    #[test]
    fn test_gzip_round_trip() {
        let payload = b"cpu,host=a usage=0.5 1700000000000000000\n";
        let compressed = gzip(payload).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn test_escape_identifier_plain_name_unchanged() {
        assert_eq!(escape_identifier("telegraf"), "telegraf");
    }

    #[test]
    fn test_escape_identifier_quote_backslash_newline() {
        assert_eq!(escape_identifier(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_identifier(r"a\b"), r"a\\b");
        assert_eq!(escape_identifier("a\nb"), r"a\nb");
    }

    #[test]
    fn test_escaped_identifier_never_unterminates_quotes() {
        // Round-trip property: after escaping, every '"' is preceded by an
        // odd run of backslashes, so the quoted identifier cannot end early.
        for name in [r#"x""#, r#""""#, "x\\", "x\\\"", "a\nb\"c\\d"] {
            let escaped = escape_identifier(name);
            let bytes = escaped.as_bytes();
            for (i, b) in bytes.iter().enumerate() {
                if *b == b'"' {
                    let backslashes = bytes[..i].iter().rev().take_while(|b| **b == b'\\').count();
                    assert_eq!(backslashes % 2, 1, "unescaped quote in {:?}", escaped);
                }
            }
        }
    }

    #[test]
    fn test_truncate_long_body() {
        let long = "x".repeat(MAX_BODY_IN_ERROR * 2);
        assert_eq!(truncate(&long).len(), MAX_BODY_IN_ERROR);
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn test_tls_missing_ca_file_fails_setup() {
        let mut config = WriterConfig::default();
        config.tls.ca = Some(std::path::PathBuf::from("/nonexistent/ca.pem"));
        let url = Url::parse("https://db-a:8086").unwrap();
        match HttpEndpoint::new(url, &config) {
            Err(Error::Tls(msg)) => assert!(msg.contains("/nonexistent/ca.pem")),
            other => panic!("expected Tls error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_tls_garbage_ca_file_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, b"not a certificate").unwrap();
        let mut config = WriterConfig::default();
        config.tls.ca = Some(path);
        let url = Url::parse("https://db-a:8086").unwrap();
        assert!(matches!(HttpEndpoint::new(url, &config), Err(Error::Tls(_))));
    }
}
