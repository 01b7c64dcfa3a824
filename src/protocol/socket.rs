//! Socket addresses and socket pairs used to demultiplex connections.

use std::fmt;

/// An IPv4 address and a port number.
///
/// The all-zero address and port 0 act as wildcards when a connection is
/// listening or has not chosen a local address.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Default)]
pub struct SocketAddr {
    /// IPv4 address.
    pub addr: [u8; 4],
    /// Port number.
    pub port: u16,
}

impl SocketAddr {
    /// Unspecified IPv4 address (`0.0.0.0`).
    pub const UNSPECIFIED: [u8; 4] = [0, 0, 0, 0];

    /// Creates a socket address from an address and port.
    pub const fn new(addr: [u8; 4], port: u16) -> Self {
        Self { addr, port }
    }

    /// Returns `true` if the address part is the wildcard address.
    pub fn is_unspecified_addr(&self) -> bool {
        self.addr == Self::UNSPECIFIED
    }

    /// Returns `true` if both address and port are unspecified.
    pub fn is_unspecified(&self) -> bool {
        self.is_unspecified_addr() && self.port == 0
    }
}

impl fmt::Display for SocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}:{}",
            self.addr[0], self.addr[1], self.addr[2], self.addr[3], self.port,
        )
    }
}

/// Socket pair identifying a connection from the local host's perspective.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Default)]
pub struct Socket {
    /// The local socket address (our IP and port).
    pub local: SocketAddr,
    /// The remote socket address (peer IP and port).
    pub remote: SocketAddr,
}

impl Socket {
    /// Creates a socket pair.
    pub const fn new(local: SocketAddr, remote: SocketAddr) -> Self {
        Self { local, remote }
    }

    /// Same pair with the local address replaced by the wildcard.
    pub fn with_any_local_addr(self) -> Self {
        Self {
            local: SocketAddr::new(SocketAddr::UNSPECIFIED, self.local.port),
            remote: self.remote,
        }
    }

    /// Same pair with the remote socket replaced by the wildcard.
    pub fn with_any_remote(self) -> Self {
        Self {
            local: self.local,
            remote: SocketAddr::default(),
        }
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local, self.remote)
    }
}
