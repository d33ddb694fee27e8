// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The write orchestrator.
//!
//! [`ClusterWriter`] owns the endpoint registry and, per write call, draws a
//! fresh random visiting order, attempts delivery sequentially, and decides
//! from the classified failure whether to recover, fail over, drop the batch,
//! or give up. One in-flight request at a time; the first success wins.
//!
//! The randomness source is owned by the writer instance (seedable via
//! [`ClusterWriter::with_rng`]) so behavior is deterministic in tests and
//! concurrent writer instances never contend on shared global state.

use reqwest::Url;

use crate::client::{Endpoint, FailureKind, HttpEndpoint, UdpEndpoint, WriteClient};
use crate::config::WriterConfig;
use crate::{Batch, Error};

/// Failover write orchestrator for one logical cluster.
///
/// Generic over the client type so tests can inject mocks; production code
/// uses [`Endpoint`] via [`ClusterWriter::connect`].
pub struct ClusterWriter<C: WriteClient = Endpoint> {
    endpoints: Vec<C>,
    rng: fastrand::Rng,
    provision: bool,
}

impl ClusterWriter<Endpoint> {
    /// Builds the endpoint registry from the configuration.
    ///
    /// URLs are partitioned by scheme: `http`/`https` become request/response
    /// endpoints, `udp` becomes a datagram endpoint, and anything else fails
    /// setup naming the offending URL. Unless provisioning is disabled, a
    /// best-effort create-database call is issued against every HTTP endpoint;
    /// failures here are logged and not propagated, since the write path
    /// retries provisioning when it actually matters.
    pub async fn connect(config: &WriterConfig) -> crate::Result<Self> {
        let mut endpoints = Vec::new();
        for raw in config.endpoint_urls() {
            let url = Url::parse(&raw).map_err(|e| Error::InvalidUrl {
                url: raw.clone(),
                reason: e.to_string(),
            })?;
            match url.scheme() {
                "http" | "https" => endpoints.push(Endpoint::Http(HttpEndpoint::new(url, config)?)),
                "udp" => endpoints.push(Endpoint::Udp(UdpEndpoint::new(&url, config)?)),
                scheme => {
                    return Err(Error::UnsupportedScheme {
                        url: raw,
                        scheme: scheme.to_string(),
                    })
                }
            }
        }

        if !config.skip_database_creation {
            for endpoint in &endpoints {
                if let Endpoint::Http(client) = endpoint {
                    if let Err(e) = client.create_database().await {
                        log::warn!(
                            "[writer] database {:?} creation on [{}] failed at connect: {}",
                            client.database(),
                            client.url(),
                            e
                        );
                    }
                }
            }
        }

        log::info!("[writer] connected with {} endpoints", endpoints.len());

        Ok(Self {
            endpoints,
            rng: fastrand::Rng::new(),
            provision: !config.skip_database_creation,
        })
    }
}

impl<C: WriteClient> ClusterWriter<C> {
    /// Builds a writer over pre-constructed clients.
    ///
    /// Provisioning on write failure is enabled; combine with
    /// [`ClusterWriter::with_provisioning`] to disable it.
    pub fn from_clients(endpoints: Vec<C>) -> Self {
        Self {
            endpoints,
            rng: fastrand::Rng::new(),
            provision: true,
        }
    }

    /// Replaces the randomness source used to draw visiting orders.
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    /// Enables or disables write-time database provisioning.
    pub fn with_provisioning(mut self, enabled: bool) -> Self {
        self.provision = enabled;
        self
    }

    /// The configured endpoints, in registry order.
    pub fn endpoints(&self) -> &[C] {
        &self.endpoints
    }

    /// Delivers one batch to the cluster.
    ///
    /// Endpoints are visited in a fresh uniformly random order; the call
    /// returns as soon as one delivery succeeds. A `DatabaseNotFound` failure
    /// triggers one provisioning attempt against the same endpoint (the
    /// corrected schema benefits the next call, not this one) and failover
    /// continues. An `IncompatibleBatch` failure drops the batch and reports
    /// success, because retrying it anywhere would fail forever. When every
    /// endpoint has failed, a single aggregate error is returned.
    pub async fn write(&mut self, batch: Batch<'_>) -> crate::Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }

        let mut order: Vec<usize> = (0..self.endpoints.len()).collect();
        self.rng.shuffle(&mut order);

        for index in order {
            let endpoint = &self.endpoints[index];
            let err = match endpoint.write(batch).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            match err.kind {
                FailureKind::DatabaseNotFound => {
                    if self.provision {
                        match endpoint.create_database().await {
                            Ok(()) => log::info!(
                                "[writer] recreated database {:?} on [{}]",
                                endpoint.database(),
                                endpoint.url()
                            ),
                            Err(e) => log::error!(
                                "[writer] database {:?} not found on [{}] and recreation failed: {}",
                                endpoint.database(),
                                endpoint.url(),
                                e
                            ),
                        }
                    }
                    log::error!("[writer] when writing to [{}]: {}", endpoint.url(), err);
                }
                FailureKind::IncompatibleBatch => {
                    log::error!(
                        "[writer] dropping batch of {} points: [{}] rejected it as incompatible: {}",
                        batch.points(),
                        endpoint.url(),
                        err
                    );
                    return Ok(());
                }
                FailureKind::Transient => {
                    log::error!("[writer] when writing to [{}]: {}", endpoint.url(), err);
                }
            }
        }

        Err(Error::AllEndpointsFailed {
            attempts: self.endpoints.len(),
        })
    }
}
