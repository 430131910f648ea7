//! Server configuration: loaded from TOML, validated once at construction time.
//!
//! Mirrors the teacher's `Config::load` pattern (`examples/boltlabs-inc-zeekoe/src/config/customer.rs`):
//! read the file, parse it, validate it, then adjust any relative paths against
//! the config file's own directory.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Plain,
    Tls,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Plain
    }
}

/// The TLS policy knobs from the base spec: whether an invalid peer certificate is
/// tolerated, and whether mutual authentication is required.
///
/// `accept_invalid_peer_cert` is parsed and validated like any other field, but
/// `tls::accept` cannot act on it — native-tls's server acceptor has no API to
/// validate a client certificate's chain of trust in the first place, so there is
/// no real distinction between "skip validation" and "apply the default trust
/// policy" to enforce. See `src/tls.rs`'s module doc and DESIGN.md.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsPolicy {
    #[serde(default)]
    pub accept_invalid_peer_cert: bool,
    #[serde(default)]
    pub require_mutual_auth: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `None` binds to all interfaces.
    pub listen_ip: Option<IpAddr>,
    pub listen_port: u16,
    pub mode: Mode,
    pub tls_identity_path: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub tls_identity_password: Option<String>,
    #[serde(skip_serializing)]
    pub shared_secret: Option<String>,
    /// Peer IPs permitted to connect. Empty means allow any.
    pub allow_list: Vec<IpAddr>,
    #[serde(flatten)]
    pub tls_policy: TlsPolicy,
    #[serde(with = "humantime_serde::option", default)]
    pub unauthenticated_grace_period: Option<Duration>,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_ip: None,
            listen_port: crate::defaults::port(),
            mode: Mode::Plain,
            tls_identity_path: None,
            tls_identity_password: None,
            shared_secret: None,
            allow_list: Vec::new(),
            tls_policy: TlsPolicy::default(),
            unauthenticated_grace_period: None,
            debug: false,
        }
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        if let Some(password) = self.tls_identity_password.as_mut() {
            password.zeroize();
        }
        if let Some(secret) = self.shared_secret.as_mut() {
            secret.zeroize();
        }
    }
}

impl Config {
    /// Read, parse, and validate a config file, resolving `tls_identity_path`
    /// relative to the file's own directory if it isn't already absolute.
    pub async fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(dir) = path.parent() {
            if let Some(identity_path) = config.tls_identity_path.take() {
                config.tls_identity_path = Some(if identity_path.is_absolute() {
                    identity_path
                } else {
                    dir.join(identity_path)
                });
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port < 1 {
            return Err(ConfigError::InvalidPort);
        }
        if self.mode == Mode::Tls && self.tls_identity_path.is_none() {
            return Err(ConfigError::MissingTlsIdentity);
        }
        if self.tls_policy.require_mutual_auth && self.mode != Mode::Tls {
            return Err(ConfigError::MutualAuthRequiresTls);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_with_mutual_auth_is_rejected() {
        let config = Config {
            tls_policy: TlsPolicy {
                require_mutual_auth: true,
                ..TlsPolicy::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MutualAuthRequiresTls)
        ));
    }

    #[test]
    fn tls_mode_without_identity_is_rejected() {
        let config = Config {
            mode: Mode::Tls,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingTlsIdentity)
        ));
    }

    #[test]
    fn zero_port_is_rejected() {
        let config = Config {
            listen_port: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[tokio::test]
    async fn relative_identity_path_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("identity.p12"), b"not a real bundle").unwrap();
        let config_path = dir.path().join("relaylink.toml");
        std::fs::write(
            &config_path,
            r#"
            mode = "tls"
            tls_identity_path = "identity.p12"
            "#,
        )
        .unwrap();

        let config = Config::load(&config_path).await.unwrap();
        assert_eq!(
            config.tls_identity_path,
            Some(dir.path().join("identity.p12"))
        );
    }

    #[tokio::test]
    async fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("relaylink.toml");
        std::fs::write(&config_path, "this is not valid toml =").unwrap();

        assert!(matches!(
            Config::load(&config_path).await,
            Err(ConfigError::Parse { .. })
        ));
    }
}
