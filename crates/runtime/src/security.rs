// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! TLS capability consumed by the connection pool and the serving side.
//!
//! Loading the PEM material is someone else's job; this type only carries it
//! to the channel and server builders.

use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

/// TLS material for outbound channels and the serving port.
#[derive(Debug, Clone, Default)]
pub struct Security {
    /// CA bundle in PEM form.
    pub ca_pem: Option<Vec<u8>>,
    /// Local certificate and key in PEM form.
    pub identity_pem: Option<(Vec<u8>, Vec<u8>)>,
    /// SNI override for servers addressed by ip.
    pub server_name_override: Option<String>,
}

impl Security {
    /// Builds the client-side TLS config, if any material is present.
    #[must_use]
    pub fn client_tls(&self) -> Option<ClientTlsConfig> {
        if self.ca_pem.is_none() && self.identity_pem.is_none() {
            return None;
        }
        let mut tls = ClientTlsConfig::new();
        if let Some(ca) = &self.ca_pem {
            tls = tls.ca_certificate(Certificate::from_pem(ca.clone()));
        }
        if let Some((cert, key)) = &self.identity_pem {
            tls = tls.identity(Identity::from_pem(cert.clone(), key.clone()));
        }
        if let Some(name) = &self.server_name_override {
            tls = tls.domain_name(name.clone());
        }
        Some(tls)
    }

    /// Builds the server-side TLS config, if an identity is present.
    #[must_use]
    pub fn server_tls(&self) -> Option<ServerTlsConfig> {
        let (cert, key) = self.identity_pem.as_ref()?;
        let mut tls =
            ServerTlsConfig::new().identity(Identity::from_pem(cert.clone(), key.clone()));
        if let Some(ca) = &self.ca_pem {
            tls = tls.client_ca_root(Certificate::from_pem(ca.clone()));
        }
        Some(tls)
    }
}
