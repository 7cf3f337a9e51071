// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Registry of active streams keyed by peer identity.
//!
//! Lookups are hot (every outbound send consults the registry for a direct
//! stream), registrations rare, hence the reader-writer lock. `get` degrades
//! to the proxy stream when a peer stream is missing or unavailable and
//! evicts peer streams that turned abnormal.

use crate::stream::StreamRw;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Streams by peer id plus the distinguished proxy slot.
#[derive(Default)]
pub struct StreamRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    peers: HashMap<String, Arc<StreamRw>>,
    proxy: Option<Arc<StreamRw>>,
}

impl StreamRegistry {
    /// The proxy stream, if one is installed.
    #[must_use]
    pub fn proxy(&self) -> Option<Arc<StreamRw>> {
        self.inner.read().proxy.clone()
    }

    /// The stream registered for exactly this peer, if any.
    #[must_use]
    pub fn try_get(&self, peer: &str) -> Option<Arc<StreamRw>> {
        self.inner.read().peers.get(peer).cloned()
    }

    /// The stream to use for a send to `peer`: the direct stream when it is
    /// live, the proxy stream otherwise. Abnormal peer entries are evicted.
    #[must_use]
    pub fn get(&self, peer: &str) -> Option<Arc<StreamRw>> {
        let (stream, evict) = {
            let inner = self.inner.read();
            match inner.peers.get(peer) {
                None => (inner.proxy.clone(), None),
                Some(direct) if direct.abnormal() => {
                    (inner.proxy.clone(), Some(Arc::clone(direct)))
                }
                Some(direct) if !direct.available() => (inner.proxy.clone(), None),
                Some(direct) => (Some(Arc::clone(direct)), None),
            }
        };
        if let Some(dead) = evict {
            dead.stop();
            let _ = self.inner.write().peers.remove(peer);
            debug!("evicted abnormal stream to {peer}");
        }
        stream
    }

    /// Registers a peer stream. Refuses to replace a live one; a dead
    /// incumbent is stopped and replaced.
    pub fn emplace(&self, peer: &str, stream: Arc<StreamRw>) -> bool {
        let displaced = {
            let mut inner = self.inner.write();
            if let Some(existing) = inner.peers.get(peer) {
                if existing.available() {
                    warn!("duplicated stream reader/writer for {peer}");
                    return false;
                }
            }
            inner.peers.insert(peer.to_owned(), stream)
        };
        if let Some(old) = displaced {
            old.stop();
        }
        true
    }

    /// Removes and stops the stream for `peer`, if any.
    pub fn remove(&self, peer: &str) {
        let removed = self.inner.write().peers.remove(peer);
        if let Some(stream) = removed {
            stream.stop();
        }
    }

    /// Installs (or replaces) the proxy stream.
    pub fn update_proxy(&self, stream: Arc<StreamRw>) {
        let displaced = {
            let mut inner = self.inner.write();
            inner.proxy.replace(stream)
        };
        if let Some(old) = displaced {
            old.stop();
        }
    }

    /// Stops and forgets every stream.
    pub fn clear(&self) {
        let (proxy, peers) = {
            let mut inner = self.inner.write();
            (
                inner.proxy.take(),
                std::mem::take(&mut inner.peers),
            )
        };
        if let Some(stream) = proxy {
            stream.stop();
        }
        for stream in peers.into_values() {
            stream.stop();
        }
    }
}
