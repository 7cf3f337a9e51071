// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Reference-counted registries for shared transports.
//!
//! Streams to the same `(ip, port)` share one tonic channel. The data-store
//! and http-gateway clients ride the same lifecycle model because their
//! shutdown must happen exactly once, when the last consumer releases.

use crate::codes::ErrorInfo;
use crate::security::Security;
use fnbus_config::BusConfig;
use fnbus_proto::ErrorCode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, error};

/// A collaborator client whose shutdown must run exactly once.
pub trait PooledClient: Send + Sync {
    /// Tears the client down. Called when the last reference is released.
    fn shutdown(&self);
}

struct ChannelEntry {
    channel: Channel,
    refs: usize,
}

struct ClientEntry {
    client: Arc<dyn PooledClient>,
    refs: usize,
}

/// Shared transports keyed by `"ip:port"`.
pub struct ConnectionPool {
    channels: Mutex<HashMap<String, ChannelEntry>>,
    data_clients: Mutex<HashMap<String, ClientEntry>>,
    http_clients: Mutex<HashMap<String, ClientEntry>>,
    connect_wait: Duration,
    max_msg_bytes: usize,
}

fn addr_key(ip: &str, port: u16) -> String {
    format!("{ip}:{port}")
}

impl ConnectionPool {
    /// Creates a pool with the configured connect deadline and size cap.
    #[must_use]
    pub fn new(cfg: &BusConfig) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            data_clients: Mutex::new(HashMap::new()),
            http_clients: Mutex::new(HashMap::new()),
            connect_wait: Duration::from_secs(cfg.connect_wait_sec),
            max_msg_bytes: cfg.max_msg_bytes(),
        }
    }

    /// Per-envelope size cap shared with the streams on these channels.
    #[must_use]
    pub fn max_msg_bytes(&self) -> usize {
        self.max_msg_bytes
    }

    /// Returns the existing channel to `ip:port` and takes a reference, or
    /// `None` if no channel exists yet.
    #[must_use]
    pub fn get(&self, ip: &str, port: u16) -> Option<Channel> {
        let key = addr_key(ip, port);
        let mut channels = self.channels.lock();
        let entry = channels.get_mut(&key)?;
        entry.refs += 1;
        Some(entry.channel.clone())
    }

    /// Creates a channel to `ip:port`, waits for it to become ready within
    /// the configured deadline, and registers it with one reference.
    pub async fn create(
        &self,
        ip: &str,
        port: u16,
        security: Option<&Security>,
    ) -> Result<Channel, ErrorInfo> {
        let key = addr_key(ip, port);
        let tls = security.and_then(Security::client_tls);
        let scheme = if tls.is_some() { "https" } else { "http" };
        let mut endpoint = Endpoint::new(format!("{scheme}://{key}"))
            .map_err(|e| {
                ErrorInfo::new(
                    ErrorCode::ErrConnectionFailed,
                    format!("invalid server address {key}: {e}"),
                )
            })?
            .connect_timeout(self.connect_wait)
            .tcp_nodelay(true);
        if let Some(tls) = tls {
            endpoint = endpoint.tls_config(tls).map_err(|e| {
                ErrorInfo::new(
                    ErrorCode::ErrConnectionFailed,
                    format!("invalid tls material for {key}: {e}"),
                )
            })?;
        }
        let channel = endpoint.connect().await.map_err(|e| {
            error!("failed to connect to grpc server {key}: {e}");
            ErrorInfo::new(
                ErrorCode::ErrConnectionFailed,
                format!("failed to connect to grpc server {key}"),
            )
        })?;
        let mut channels = self.channels.lock();
        let entry = channels.entry(key).or_insert(ChannelEntry {
            channel: channel.clone(),
            refs: 0,
        });
        entry.refs += 1;
        Ok(entry.channel.clone())
    }

    /// Drops one reference to the channel; the entry is removed when the
    /// count returns to zero.
    pub fn release(&self, ip: &str, port: u16) -> Result<(), ErrorInfo> {
        let key = addr_key(ip, port);
        let mut channels = self.channels.lock();
        let Some(entry) = channels.get_mut(&key) else {
            return Err(ErrorInfo::new(
                ErrorCode::ErrInnerSystemError,
                format!("no ref count info for channel {key}"),
            ));
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            debug!("last reference to {key} released, dropping channel");
            let _ = channels.remove(&key);
        }
        Ok(())
    }

    /// Returns the data-store client for `ip:port`, creating it with `init`
    /// on first use. Takes a reference either way.
    pub fn get_or_init_data_client<F>(&self, ip: &str, port: u16, init: F) -> Arc<dyn PooledClient>
    where
        F: FnOnce() -> Arc<dyn PooledClient>,
    {
        get_or_init(&self.data_clients, &addr_key(ip, port), init)
    }

    /// Releases the data-store client; shutdown runs on the last release.
    pub fn release_data_client(&self, ip: &str, port: u16) -> Result<(), ErrorInfo> {
        release_client(&self.data_clients, &addr_key(ip, port), "data-store")
    }

    /// Returns the http gateway client for `ip:port`, creating it with
    /// `init` on first use. Takes a reference either way.
    pub fn get_or_init_http_client<F>(&self, ip: &str, port: u16, init: F) -> Arc<dyn PooledClient>
    where
        F: FnOnce() -> Arc<dyn PooledClient>,
    {
        get_or_init(&self.http_clients, &addr_key(ip, port), init)
    }

    /// Releases the http gateway client; shutdown runs on the last release.
    pub fn release_http_client(&self, ip: &str, port: u16) -> Result<(), ErrorInfo> {
        release_client(&self.http_clients, &addr_key(ip, port), "http")
    }
}

fn get_or_init<F>(
    registry: &Mutex<HashMap<String, ClientEntry>>,
    key: &str,
    init: F,
) -> Arc<dyn PooledClient>
where
    F: FnOnce() -> Arc<dyn PooledClient>,
{
    let mut clients = registry.lock();
    let entry = clients.entry(key.to_owned()).or_insert_with(|| ClientEntry {
        client: init(),
        refs: 0,
    });
    entry.refs += 1;
    Arc::clone(&entry.client)
}

fn release_client(
    registry: &Mutex<HashMap<String, ClientEntry>>,
    key: &str,
    what: &str,
) -> Result<(), ErrorInfo> {
    // Shutdown runs outside the lock.
    let to_shutdown = {
        let mut clients = registry.lock();
        let Some(entry) = clients.get_mut(key) else {
            return Err(ErrorInfo::new(
                ErrorCode::ErrInnerSystemError,
                format!("no ref count info for {what} client {key}"),
            ));
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            clients.remove(key).map(|e| e.client)
        } else {
            None
        }
    };
    if let Some(client) = to_shutdown {
        debug!("shutting down {what} client {key}");
        client.shutdown();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient(Arc<AtomicUsize>);

    impl PooledClient for CountingClient {
        fn shutdown(&self) {
            let _ = self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn client_shutdown_runs_exactly_once() {
        let pool = ConnectionPool::new(&BusConfig::default());
        let shutdowns = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&shutdowns);
        let _a = pool.get_or_init_data_client("10.0.0.1", 4710, || {
            Arc::new(CountingClient(counted))
        });
        let _b = pool.get_or_init_data_client("10.0.0.1", 4710, || {
            unreachable!("second get must reuse the existing client")
        });

        pool.release_data_client("10.0.0.1", 4710).unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 0);
        pool.release_data_client("10.0.0.1", 4710).unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        // the entry is gone: another release is an error
        assert!(pool.release_data_client("10.0.0.1", 4710).is_err());
    }

    #[test]
    fn get_without_create_returns_none() {
        let pool = ConnectionPool::new(&BusConfig::default());
        assert!(pool.get("127.0.0.1", 9999).is_none());
    }

    #[tokio::test]
    async fn create_to_unreachable_endpoint_fails_with_connection_error() {
        let mut cfg = BusConfig::default();
        cfg.connect_wait_sec = 1;
        let pool = ConnectionPool::new(&cfg);
        // TEST-NET-1 address, nothing listens there
        let err = pool.create("192.0.2.1", 4710, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ErrConnectionFailed);
    }
}
