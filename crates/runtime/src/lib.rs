// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Client-side runtime of the function bus.
//!
//! This crate is the library linked into every driver and every
//! function-instance worker. It brokers at-least-once request/response
//! traffic over long-lived bidirectional streams to the central function
//! proxy and, when enabled, directly between peer workers with transparent
//! fallback to the proxy.
//!
//! The moving parts:
//! - [`broker::Broker`]: the wired-request table with retry, timeout and
//!   resend-on-reconnect;
//! - [`stream::StreamRw`]: one reader/writer pair per logical stream,
//!   single or batched framing;
//! - [`registry::StreamRegistry`]: active streams keyed by peer identity;
//! - [`pool::ConnectionPool`]: ref-counted transport channels;
//! - [`service::BusService`]: the serving side accepting inbound streams;
//! - [`client::BusClient`]: the typed façade tying it all together.

pub mod broker;
pub mod client;
pub mod codes;
pub mod dispatch;
pub mod ids;
pub mod pool;
pub mod registry;
pub mod security;
pub mod service;
pub mod stream;

pub use broker::{Broker, CreateTicket, GroupCreateTicket, InvokeTicket, NotifyOutcome};
pub use client::{BusClient, BusClientOptions, ClientMode};
pub use codes::ErrorInfo;
pub use dispatch::{Handlers, InstanceState};
pub use security::Security;
