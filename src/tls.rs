// SPDX-License-Identifier: Apache-2.0
//! Certificate trust policy for LDAPS connections.
//!
//! Certificates are first checked against the platform trust store. When that fails and untrusted
//! certificates are allowed, the chain is rebuilt with no revocation checking and no hostname check:
//! the platform roots and every certificate the server presented count as anchors. A self-signed
//! certificate is accepted when its own signature verifies and it is within its validity period,
//! whether or not it is flagged as a CA. Turn `ldap.allow_untrusted_certificates` off to require
//! platform-trusted certificates only.
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{verify_server_cert_signed_by_trust_anchor, WebPkiServerVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, SignatureVerificationAlgorithm, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, info, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;

#[derive(Debug)]
pub struct ChainRebuildVerifier {
    roots: Arc<RootCertStore>,
    /// `None` when there are no roots to verify against
    platform: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
    allow_untrusted: bool,
}

impl ChainRebuildVerifier {
    /// Verifier backed by the platform trust store
    pub fn new(provider: Arc<CryptoProvider>, allow_untrusted: bool) -> Self {
        Self::with_roots(platform_roots(), provider, allow_untrusted)
    }

    pub fn with_roots(roots: RootCertStore, provider: Arc<CryptoProvider>, allow_untrusted: bool) -> Self {
        let roots = Arc::new(roots);
        let platform = if roots.is_empty() {
            warn!("No platform trust anchors available for directory TLS");
            None
        } else {
            match WebPkiServerVerifier::builder_with_provider(roots.clone(), provider.clone()).build() {
                Ok(verifier) => Some(verifier),
                Err(e) => {
                    warn!(error = %e, "Platform certificate verifier unavailable");
                    None
                }
            }
        };
        Self {
            roots,
            platform,
            provider,
            allow_untrusted,
        }
    }

    fn verify_with_platform(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match &self.platform {
            Some(verifier) => {
                verifier.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            }
            None => Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)),
        }
    }
}

impl ServerCertVerifier for ChainRebuildVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let policy_error = match self.verify_with_platform(end_entity, intermediates, server_name, ocsp_response, now) {
            Ok(verified) => return Ok(verified),
            Err(e) => e,
        };

        if !self.allow_untrusted {
            warn!(error = %policy_error, "Directory certificate rejected by platform trust store");
            return Err(policy_error);
        }

        debug!(error = %policy_error, "Platform validation failed, rebuilding chain without revocation checks");
        rebuild_chain(
            end_entity,
            intermediates,
            &self.roots,
            now,
            self.provider.signature_verification_algorithms.all,
        )
        .map(|()| ServerCertVerified::assertion())
        .inspect_err(|e| warn!(error = %e, "Directory certificate chain could not be built"))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Build a chain for `end_entity` that ignores the server name and revocation.
///
/// `roots` and every presented certificate serve as anchors. Signatures and validity periods
/// are still checked.
pub fn rebuild_chain(
    end_entity: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
    roots: &RootCertStore,
    now: UnixTime,
    algorithms: &[&'static dyn SignatureVerificationAlgorithm],
) -> Result<(), rustls::Error> {
    let (_, leaf) = parse_x509_certificate(end_entity.as_ref())
        .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;

    // webpki refuses CA certificates in the end-entity position, so self-signed ones are checked here
    if leaf.subject() == leaf.issuer() {
        return verify_self_signed(&leaf, now);
    }

    let mut anchors = roots.clone();
    let (added, ignored) = anchors.add_parsable_certificates(intermediates.iter().map(|c| c.clone().into_owned()));
    debug!(added, ignored, "Presented certificates added as anchors");

    let parsed = ParsedCertificate::try_from(end_entity)?;
    verify_server_cert_signed_by_trust_anchor(&parsed, &anchors, intermediates, now, algorithms)
}

fn verify_self_signed(cert: &X509Certificate<'_>, now: UnixTime) -> Result<(), rustls::Error> {
    let now = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);
    let validity = cert.validity();
    if now < validity.not_before.timestamp() {
        return Err(rustls::Error::InvalidCertificate(CertificateError::NotValidYet));
    }
    if now > validity.not_after.timestamp() {
        return Err(rustls::Error::InvalidCertificate(CertificateError::Expired));
    }
    cert.verify_signature(None)
        .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadSignature))
}

fn platform_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for e in &loaded.errors {
        warn!(error = %e, "Error loading platform certificates");
    }
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    info!(added, ignored, "Loaded platform trust anchors for directory TLS");
    roots
}

/// rustls client configuration for LDAPS binds
pub fn directory_client_config(allow_untrusted: bool) -> Result<Arc<ClientConfig>, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = ChainRebuildVerifier::new(provider.clone(), allow_untrusted);
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}
