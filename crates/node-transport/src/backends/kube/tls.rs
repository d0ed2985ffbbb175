//! TLS client configuration for the API server connection

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;

use super::config::ClusterAccess;
use crate::error::{Error, Result};

/// Build the rustls client configuration for a cluster
pub fn client_config(access: &ClusterAccess) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let algorithms = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error(format!("unsupported TLS provider: {}", e)))?;

    let builder = if access.insecure {
        tracing::warn!("Server certificate verification disabled for {}", access.server);
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { algorithms }))
    } else {
        builder.with_root_certificates(root_store(access)?)
    };

    let config = match (&access.client_cert_pem, &access.client_key_pem) {
        (Some(cert), Some(key)) => {
            let certs = parse_certs(cert)?;
            let key = parse_key(key)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| tls_error(format!("invalid client certificate: {}", e)))?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

fn root_store(access: &ClusterAccess) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    match &access.ca_pem {
        Some(pem) => {
            for cert in parse_certs(pem)? {
                store
                    .add(cert)
                    .map_err(|e| tls_error(format!("invalid CA certificate: {}", e)))?;
            }
        }
        None => store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(store)
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("failed to parse certificates: {}", e)))?;
    if certs.is_empty() {
        return Err(tls_error("no certificates found in PEM data"));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| tls_error(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| tls_error("no private key found in PEM data"))
}

fn tls_error(reason: impl Into<String>) -> Error {
    Error::init("kubeconfig", reason)
}

/// Accepts any server certificate while still checking handshake signatures
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
