// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the configuration layer.

/// All errors that can occur while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The provided configuration did not deserialize.
    #[error("invalid bus configuration: {error}")]
    InvalidConfig {
        /// The underlying deserialization error.
        error: String,
    },
}
