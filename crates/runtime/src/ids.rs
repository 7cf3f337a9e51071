// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Request and message identifiers.
//!
//! A request id is a fixed-length hex string ending in a `00` sequence
//! suffix. Each send attempt derives its message id by appending the retry
//! count as two hex chars, so a response's message id always folds back to
//! the request id regardless of which attempt produced it.

use rand::Rng;

/// Length of a request id in hex chars, including the `00` suffix.
pub const REQUEST_ID_LEN: usize = 32;

const SEQ_SUFFIX_LEN: usize = 2;

/// Generates a fresh request id.
#[must_use]
pub fn gen_request_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; (REQUEST_ID_LEN - SEQ_SUFFIX_LEN) / 2] = rng.random();
    let mut id = hex::encode(bytes);
    id.push_str("00");
    id
}

/// Derives the message id of a send attempt: request id plus retry byte.
#[must_use]
pub fn gen_message_id(request_id: &str, retry: u8) -> String {
    format!("{request_id}{retry:02x}")
}

/// Recovers the request id from a message id by stripping the retry suffix.
///
/// Ids shorter than a full request id are returned unchanged so malformed
/// peers cannot panic the dispatcher.
#[must_use]
pub fn request_id_of(message_id: &str) -> &str {
    if message_id.len() < REQUEST_ID_LEN {
        return message_id;
    }
    &message_id[..REQUEST_ID_LEN]
}

/// Recovers the retry count encoded in a message id, if well formed.
#[must_use]
pub fn retry_of(message_id: &str) -> Option<u8> {
    if message_id.len() != REQUEST_ID_LEN + SEQ_SUFFIX_LEN {
        return None;
    }
    u8::from_str_radix(&message_id[REQUEST_ID_LEN..], 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_have_fixed_shape() {
        let id = gen_request_id();
        assert_eq!(id.len(), REQUEST_ID_LEN);
        assert!(id.ends_with("00"));
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn message_id_roundtrips_across_retries() {
        let req = gen_request_id();
        for retry in [0u8, 1, 7, 255] {
            let msg = gen_message_id(&req, retry);
            assert_eq!(request_id_of(&msg), req);
            assert_eq!(retry_of(&msg), Some(retry));
        }
    }

    #[test]
    fn short_message_ids_do_not_panic() {
        assert_eq!(request_id_of("abc"), "abc");
        assert_eq!(retry_of("abc"), None);
    }
}
