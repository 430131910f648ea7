//! PKCS#12 identity loading and the TLS handshake/policy checks run by the
//! Connection Initializer.
//!
//! `native-tls` is used instead of the teacher's `tokio-rustls` because it is the
//! crate in this ecosystem that actually loads PKCS#12 bundles
//! (`native_tls::Identity::from_pkcs12`), which is what the base spec calls for.
//! The tradeoff: native-tls's safe, cross-platform builder does not expose a way to
//! request a client certificate, so `require_mutual_auth` can only be *checked*
//! (via [`native_tls::TlsStream::peer_certificate`]) after the fact, not forced —
//! documented in DESIGN.md as a known limitation of this backend choice.
//!
//! `TlsPolicy::accept_invalid_peer_cert` has the same limitation, one step
//! further: native-tls's `TlsAcceptorBuilder` exposes no equivalent of the
//! client-side `danger_accept_invalid_certs`, and no chain-of-trust API at all for
//! a server to validate a certificate a client presented. There is nothing in this
//! backend to skip or enforce, so the flag is accepted into `Config` for surface
//! completeness (and because `TlsPolicy` mirrors the base spec's configuration
//! surface one-for-one) but `accept` below cannot act on it — see DESIGN.md.

use std::path::Path;

use native_tls::{Identity, Protocol};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

use crate::config::TlsPolicy;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read PKCS#12 identity file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse PKCS#12 identity: {0}")]
    Parse(native_tls::Error),
}

/// Load a PKCS#12 identity bundle (certificate + private key) from disk.
pub fn load_identity(path: &Path, password: &str) -> Result<Identity, IdentityError> {
    let bytes = std::fs::read(path)?;
    Identity::from_pkcs12(&bytes, password).map_err(IdentityError::Parse)
}

/// Build a TLS acceptor for the given identity, requiring TLS 1.2 at minimum.
pub fn build_acceptor(identity: Identity) -> Result<tokio_native_tls::TlsAcceptor, native_tls::Error> {
    let acceptor = native_tls::TlsAcceptor::builder(identity)
        .min_protocol_version(Some(Protocol::Tlsv12))
        .build()?;
    Ok(tokio_native_tls::TlsAcceptor::from(acceptor))
}

/// Why a TLS-wrapped connection was rejected.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("TLS handshake failed: {0}")]
    Tls(native_tls::Error),
    #[error("connection did not satisfy the configured TLS policy: {0}")]
    Policy(&'static str),
}

impl HandshakeError {
    /// `native_tls::Error` doesn't expose a structured way to tell "peer hung up
    /// before finishing the handshake" apart from a genuine protocol failure
    /// across all three of its platform backends, so this falls back to matching
    /// the rendered message for the cases the base spec calls out as routine. A
    /// policy failure is always logged in full since it is this crate's own
    /// post-handshake check, not an opaque library error.
    pub fn is_routine(&self) -> bool {
        match self {
            HandshakeError::Tls(err) => {
                let text = err.to_string().to_lowercase();
                text.contains("unexpected eof")
                    || text.contains("connection reset")
                    || text.contains("broken pipe")
                    || text.contains("connection aborted")
            }
            HandshakeError::Policy(_) => false,
        }
    }
}

/// Perform the server-side handshake and verify it against the configured policy.
///
/// `policy.accept_invalid_peer_cert` is intentionally not read here: native-tls's
/// server acceptor has no API to validate (or to skip validating) a client
/// certificate's chain of trust, so there is no real check this function could
/// perform for that flag either way (see this module's doc comment).
/// `require_mutual_auth` is, by contrast, checked below, because "a certificate
/// was presented at all" is something [`native_tls::TlsStream::peer_certificate`]
/// can answer even without chain validation.
pub async fn accept(
    acceptor: &tokio_native_tls::TlsAcceptor,
    stream: TcpStream,
    policy: &TlsPolicy,
) -> Result<TlsStream<TcpStream>, HandshakeError> {
    let tls_stream = acceptor.accept(stream).await.map_err(HandshakeError::Tls)?;

    let peer_cert_present = tls_stream
        .get_ref()
        .peer_certificate()
        .map_err(HandshakeError::Tls)?
        .is_some();

    if policy.require_mutual_auth && !peer_cert_present {
        return Err(HandshakeError::Policy(
            "mutual authentication required but the peer presented no certificate",
        ));
    }

    Ok(tls_stream)
}
