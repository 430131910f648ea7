//! Crate-boundary error types: everything a caller can see thrown out of
//! construction or listener bind. Per-connection failures never reach here — they
//! are logged and isolated to the connection that raised them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("listen port must be at least 1")]
    InvalidPort,
    #[error("mode = \"tls\" requires a PKCS#12 identity path")]
    MissingTlsIdentity,
    #[error("require_mutual_auth requires mode = \"tls\"")]
    MutualAuthRequiresTls,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to load TLS identity: {0}")]
    Identity(#[from] crate::tls::IdentityError),
    #[error("failed to build TLS acceptor: {0}")]
    Acceptor(native_tls::Error),
}
