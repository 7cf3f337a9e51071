// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration of the function-bus client runtime.
//!
//! A [`BusConfig`] is deserialized from JSON (or built from [`Default`]) and
//! then overridden by environment variables for the handful of knobs that
//! operators set per pod.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod error;

pub use error::Error;

/// The distinguished peer id of the central function proxy.
pub const FUNCTION_PROXY: &str = "function-proxy";

const MEGABYTE: usize = 1024 * 1024;

/// Runtime configuration for the bus client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-envelope size cap in megabytes (`MAX_GRPC_SIZE`).
    pub max_grpc_mb: u32,
    /// Initial per-attempt ACK wait in seconds.
    pub request_ack_timeout_sec: u64,
    /// Accumulated retry window in seconds (`REQUEST_ACK_ACC_MAX_SEC`).
    pub request_ack_acc_max_sec: u64,
    /// Transport reconnect backoff floor in milliseconds.
    pub reconnect_backoff_min_ms: u64,
    /// Transport reconnect backoff ceiling in milliseconds.
    pub reconnect_backoff_max_ms: u64,
    /// Whether the direct peer-to-peer path is enabled
    /// (`RUNTIME_DIRECT_CONNECTION_ENABLE`).
    pub direct_connection_enable: bool,
    /// Listen ip for the direct-call server in client mode (`POD_IP`).
    pub pod_ip: String,
    /// Listen port for the direct-call server in client mode
    /// (`DIRECT_RUNTIME_SERVER_PORT`).
    pub direct_runtime_port: u16,
    /// TLS SNI override handed to the channel builder.
    pub server_name_override: Option<String>,
    /// Grace window for a proxy stream to reconnect before outstanding
    /// requests are failed.
    pub proxy_disconnect_timeout_ms: u64,
    /// Grace window for a direct peer stream to reconnect.
    pub peer_disconnect_timeout_ms: u64,
    /// How long to wait for a new channel to become ready.
    pub connect_wait_sec: u64,
    /// Identity of the containing worker, validated against inbound proxy
    /// streams (`INSTANCE_ID`).
    pub instance_id: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_grpc_mb: 10,
            request_ack_timeout_sec: 5,
            request_ack_acc_max_sec: 30,
            reconnect_backoff_min_ms: 100,
            reconnect_backoff_max_ms: 5_000,
            direct_connection_enable: false,
            pod_ip: String::new(),
            direct_runtime_port: 0,
            server_name_override: None,
            proxy_disconnect_timeout_ms: 900_000,
            peer_disconnect_timeout_ms: 30_000,
            connect_wait_sec: 5,
            instance_id: String::new(),
        }
    }
}

impl BusConfig {
    /// Builds a config from defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Parses a config from a JSON value, then applies environment
    /// overrides.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        let mut cfg: Self =
            serde_json::from_value(value).map_err(|e| Error::InvalidConfig {
                error: e.to_string(),
            })?;
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse::<u32>("MAX_GRPC_SIZE") {
            self.max_grpc_mb = v;
        }
        if let Some(v) = env_parse::<u64>("REQUEST_ACK_ACC_MAX_SEC") {
            self.request_ack_acc_max_sec = v;
        }
        if let Some(v) = env_parse::<bool>("RUNTIME_DIRECT_CONNECTION_ENABLE") {
            self.direct_connection_enable = v;
        }
        if let Ok(v) = std::env::var("POD_IP") {
            self.pod_ip = v;
        }
        if let Some(v) = env_parse::<u16>("DIRECT_RUNTIME_SERVER_PORT") {
            self.direct_runtime_port = v;
        }
        if let Ok(v) = std::env::var("INSTANCE_ID") {
            self.instance_id = v;
        }
    }

    /// Per-envelope size cap in bytes.
    #[must_use]
    pub fn max_msg_bytes(&self) -> usize {
        self.max_grpc_mb as usize * MEGABYTE
    }

    /// Floor of the stream reconnect backoff.
    #[must_use]
    pub fn reconnect_backoff_min(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_min_ms)
    }

    /// Ceiling of the stream reconnect backoff.
    #[must_use]
    pub fn reconnect_backoff_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_max_ms)
    }

    /// Grace window before the proxy-disconnect sweep runs.
    #[must_use]
    pub fn proxy_disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_disconnect_timeout_ms)
    }

    /// Grace window before a direct peer is declared gone.
    #[must_use]
    pub fn peer_disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_disconnect_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_sane() {
        let cfg = BusConfig::default();
        assert_eq!(cfg.max_grpc_mb, 10);
        assert_eq!(cfg.max_msg_bytes(), 10 * 1024 * 1024);
        assert!(!cfg.direct_connection_enable);
        assert!(cfg.request_ack_timeout_sec <= cfg.request_ack_acc_max_sec);
    }

    #[test]
    fn from_json_accepts_partial_config() {
        let cfg = BusConfig::from_json(json!({
            "max_grpc_mb": 2,
            "direct_connection_enable": true,
            "direct_runtime_port": 31501
        }))
        .expect("valid config");
        assert_eq!(cfg.max_grpc_mb, 2);
        assert!(cfg.direct_connection_enable);
        assert_eq!(cfg.direct_runtime_port, 31501);
        // untouched fields keep their defaults
        assert_eq!(cfg.reconnect_backoff_min_ms, 100);
    }

    #[test]
    fn from_json_rejects_wrong_types() {
        let res = BusConfig::from_json(json!({ "max_grpc_mb": "lots" }));
        assert!(res.is_err());
    }
}
