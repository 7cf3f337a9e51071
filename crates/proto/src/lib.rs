// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Wire protocol of the function bus: the streaming envelope, its message
//! bodies, the error codes shared with the proxy, and the gRPC stubs.
//!
//! The stubs under [`proto`] are vendored; see `build.rs` for the
//! regeneration workflow.

pub mod message;

/// Expose the function-bus gRPC services.
/// See the build.rs file for more information.
#[path = ""]
pub mod proto {
    #[path = ""]
    pub mod fnbus {
        #[allow(unused_qualifications)]
        #[allow(unused_results)]
        #[allow(clippy::enum_variant_names)]
        #[allow(rustdoc::invalid_html_tags)]
        #[allow(missing_docs)]
        #[path = "stubs/fnbus.v1.rs"]
        pub mod v1;
    }
}

pub use message::MsgKind;
pub use proto::fnbus::v1::{BatchStreamMsg, ErrorCode, Signal, StreamMsg, stream_msg::Body};
