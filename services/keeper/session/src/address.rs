//! Server address list.
//!
//! Addresses are shuffled once when the list is built and then cycled in a
//! fixed order, so reconnect attempts from many clients spread over the
//! whole ensemble.

use crate::error::{KeeperError, KeeperResult};
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::fmt;

/// Port used when an address omits one
pub const DEFAULT_PORT: u16 = 2181;

/// A single `host:port` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// Host name or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl ServerAddress {
    /// Create a new server address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host` or `host:port`
    pub fn parse(address: &str) -> KeeperResult<Self> {
        let address = address.trim();
        let (host, port) = match address.rsplit_once(':') {
            // Bracketed IPv6 literal without port, e.g. [::1]
            Some(_) if address.ends_with(']') => (address, DEFAULT_PORT),
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    KeeperError::InvalidArgument(format!("bad port in address {address:?}"))
                })?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(KeeperError::InvalidArgument(format!(
                "missing host in address {address:?}"
            )));
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Round-robin list of ensemble members
#[derive(Debug, Clone)]
pub struct AddressList {
    addresses: VecDeque<ServerAddress>,
}

impl AddressList {
    /// Parse a comma-joined list such as `zk1:2181,zk2,zk3:2182`
    pub fn parse(addresses: &str) -> KeeperResult<Self> {
        Self::from_list(addresses.split(',').filter(|a| !a.trim().is_empty()))
    }

    /// Parse an explicit list of `host[:port]` entries
    pub fn from_list<I, S>(addresses: I) -> KeeperResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = addresses
            .into_iter()
            .map(|address| ServerAddress::parse(address.as_ref()))
            .collect::<KeeperResult<Vec<_>>>()?;
        Self::from_addresses(parsed)
    }

    /// Build from already parsed addresses
    pub fn from_addresses(mut addresses: Vec<ServerAddress>) -> KeeperResult<Self> {
        if addresses.is_empty() {
            return Err(KeeperError::InvalidArgument(
                "no server addresses given".to_string(),
            ));
        }

        addresses.shuffle(&mut rand::thread_rng());
        Ok(Self {
            addresses: addresses.into(),
        })
    }

    /// Take the head of the list, move it to the tail and return it
    pub fn rotate(&mut self) -> ServerAddress {
        // Construction guarantees at least one entry
        self.addresses.rotate_left(1);
        self.addresses[self.addresses.len() - 1].clone()
    }

    /// Number of addresses
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the list is empty (never true for a constructed list)
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Current order, head first
    pub fn iter(&self) -> impl Iterator<Item = &ServerAddress> {
        self.addresses.iter()
    }
}
