// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the client runtime.
//!
//! Two wire codes are transient and feed the broker's retry loop; everything
//! else is terminal for the outstanding request. Oversize payloads map to
//! `ERR_PARAM_INVALID` on purpose so they are never retried.

use fnbus_proto::ErrorCode;

/// A wire error code plus human-readable context.
///
/// Carried through write acknowledgements, settlement paths and synthesized
/// notifies. `timed_out` marks errors fabricated by the broker's timeout
/// timer so upper layers can fire cancellation signals.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {message}", .code.as_str_name())]
pub struct ErrorInfo {
    /// Wire-level error code.
    pub code: ErrorCode,
    /// Human-readable context.
    pub message: String,
    /// Set when this error was synthesized by a request timeout.
    pub timed_out: bool,
}

impl ErrorInfo {
    /// Creates an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timed_out: false,
        }
    }

    /// A transient communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ErrInnerCommunication, message)
    }

    /// A non-retryable parameter error.
    pub fn param_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ErrParamInvalid, message)
    }

    /// The terminal error handed to every pending request on shutdown.
    pub fn finalized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ErrFinalized, message)
    }

    /// An inner-system error synthesized by a timeout timer.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ErrInnerSystemError,
            message: message.into(),
            timed_out: true,
        }
    }

    /// Whether this error feeds the retry loop instead of settling.
    #[must_use]
    pub fn is_communication(&self) -> bool {
        is_communication_code(self.code)
    }
}

/// Whether a wire code is a transient communication failure.
#[must_use]
pub fn is_communication_code(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::ErrRequestBetweenRuntimeBus | ErrorCode::ErrInnerCommunication
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn communication_codes_are_retryable() {
        assert!(is_communication_code(ErrorCode::ErrRequestBetweenRuntimeBus));
        assert!(is_communication_code(ErrorCode::ErrInnerCommunication));
        assert!(!is_communication_code(ErrorCode::ErrParamInvalid));
        assert!(!is_communication_code(ErrorCode::ErrUserFunctionException));
        assert!(!is_communication_code(ErrorCode::ErrNone));
    }

    #[test]
    fn timeout_errors_are_flagged() {
        let err = ErrorInfo::timeout("invoke request timeout");
        assert!(err.timed_out);
        assert_eq!(err.code, ErrorCode::ErrInnerSystemError);
        assert!(!err.is_communication());
    }
}
