// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fire-and-forget datagram endpoint.
//!
//! Sends the serialized payload as one or more datagrams no larger than the
//! configured payload size. Chunks split at newline boundaries when one is
//! available inside the limit, so protocol lines are not cut mid-record.
//! There is no provisioning operation on this transport.

use std::net::UdpSocket;

use reqwest::Url;

use super::WriteError;
use crate::{Batch, Error};

/// One datagram endpoint of the cluster.
///
/// The socket is bound and connected once at setup and reused for every
/// write. Delivery is best-effort; only local send errors are observable.
pub struct UdpEndpoint {
    socket: UdpSocket,
    url: String,
    database: String,
    payload_size: usize,
}

impl UdpEndpoint {
    /// Binds a local socket and connects it to the `udp://host:port` target.
    pub fn new(url: &Url, config: &crate::WriterConfig) -> Result<Self, Error> {
        let host = url.host_str().ok_or_else(|| Error::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        let port = url.port().ok_or_else(|| Error::InvalidUrl {
            url: url.to_string(),
            reason: "missing port".to_string(),
        })?;

        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| Error::Socket {
            url: url.to_string(),
            reason: format!("bind: {}", e),
        })?;
        socket.connect((host, port)).map_err(|e| Error::Socket {
            url: url.to_string(),
            reason: format!("connect: {}", e),
        })?;

        log::debug!("[udp] endpoint ready for [{}] payload_size={}", url, config.udp_payload);

        Ok(Self {
            socket,
            url: url.to_string(),
            database: config.database.clone(),
            payload_size: config.udp_payload,
        })
    }

    /// Sends one serialized batch as a sequence of datagrams.
    pub async fn write(&self, batch: Batch<'_>) -> Result<(), WriteError> {
        let mut sent = 0usize;
        for chunk in datagram_chunks(batch.payload(), self.payload_size) {
            self.socket
                .send(chunk)
                .map_err(|e| WriteError::transient(format!("send: {}", e)))?;
            sent += 1;
        }
        log::debug!(
            "[udp] wrote {} points as {} datagrams to [{}]",
            batch.points(),
            sent,
            self.url
        );
        Ok(())
    }

    /// Datagram transports cannot provision a database; reports success.
    pub async fn create_database(&self) -> Result<(), WriteError> {
        log::debug!("[udp] create database is a no-op for [{}]", self.url);
        Ok(())
    }

    /// The endpoint address, for log messages.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The target database name.
    pub fn database(&self) -> &str {
        &self.database
    }
}

/// Splits `payload` into datagram-sized chunks.
///
/// Each chunk is at most `limit` bytes. When a chunk would end mid-line and a
/// newline exists inside the window, the chunk ends after the last newline
/// instead; a single line longer than `limit` is hard-split.
fn datagram_chunks(payload: &[u8], limit: usize) -> Vec<&[u8]> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        if rest.len() <= limit {
            chunks.push(rest);
            break;
        }
        let window = &rest[..limit];
        let cut = match window.iter().rposition(|b| *b == b'\n') {
            Some(pos) => pos + 1,
            None => limit,
        };
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    chunks
}
