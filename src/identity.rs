//! Client identity: the canonical `host:port` of a connected peer.

use std::fmt;
use std::net::SocketAddr;

/// The stable identity of a live connection, used as the Registry key and as the
/// argument to every caller-facing per-client operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for ClientId {
    fn from(addr: SocketAddr) -> Self {
        ClientId(addr.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for ClientId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_host_colon_port() {
        let addr: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        let id = ClientId::from(addr);
        assert_eq!(id.to_string(), "127.0.0.1:4321");
    }
}
