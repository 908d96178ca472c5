//! Configuration handling for the keeper binary.
//!
//! Settings come from the `keeper:` section of a YAML file, then `KEEPER_*`
//! environment variables, then command-line flags, each layer overriding
//! the one before.

use anyhow::{Context, Result};
use keeper_session::{AddressList, SessionConfig};
use keeper_wire::DEFAULT_MAX_FRAME_SIZE;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeeperConfig {
    /// Ensemble members as `host[:port]`
    pub servers: Vec<String>,
    /// Requested session timeout
    pub timeout: Duration,
    /// Maximum random delay before each connection attempt
    pub connect_delay: Duration,
    /// Handshake deadline, derived from the timeout when unset
    pub connect_timeout: Option<Duration>,
    /// Largest accepted frame
    pub max_frame_size: usize,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:2181".to_string()],
            timeout: Duration::from_secs(4),
            connect_delay: Duration::from_millis(200),
            connect_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Root of the YAML file
#[derive(Debug, Deserialize)]
struct RootConfig {
    keeper: Option<KeeperSection>,
}

#[derive(Debug, Deserialize)]
struct KeeperSection {
    servers: Option<Servers>,
    timeout: Option<String>,
    connect_delay: Option<String>,
    connect_timeout: Option<String>,
    max_frame_size: Option<usize>,
}

/// Servers may be given as one comma-joined string or as a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Servers {
    Joined(String),
    List(Vec<String>),
}

impl Servers {
    fn into_vec(self) -> Vec<String> {
        match self {
            Servers::Joined(joined) => split_servers(&joined),
            Servers::List(list) => list,
        }
    }
}

fn split_servers(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).with_context(|| format!("invalid duration for {key}: {value:?}"))
}

impl KeeperConfig {
    /// Load configuration from file and environment variables.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();
        let path = config_path.as_ref();

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let root: RootConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {:?}", path))?;
                if let Some(section) = root.keeper {
                    config.apply_section(section)?;
                }
                info!("Loaded configuration from {:?}", path);
            }
            Err(_) => warn!("Config file {:?} not found, using defaults", path),
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_section(&mut self, section: KeeperSection) -> Result<()> {
        if let Some(servers) = section.servers {
            self.servers = servers.into_vec();
        }
        if let Some(timeout) = section.timeout {
            self.timeout = parse_duration("timeout", &timeout)?;
        }
        if let Some(delay) = section.connect_delay {
            self.connect_delay = parse_duration("connect_delay", &delay)?;
        }
        if let Some(connect_timeout) = section.connect_timeout {
            self.connect_timeout = Some(parse_duration("connect_timeout", &connect_timeout)?);
        }
        if let Some(max_frame_size) = section.max_frame_size {
            self.max_frame_size = max_frame_size;
        }
        Ok(())
    }

    /// Apply `KEEPER_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(servers) = lookup("KEEPER_SERVERS") {
            self.servers = split_servers(&servers);
            info!("Servers overridden by environment: {}", servers);
        }
        if let Some(timeout) = lookup("KEEPER_TIMEOUT") {
            self.timeout = parse_duration("KEEPER_TIMEOUT", &timeout)?;
            info!("Timeout overridden by environment: {}", timeout);
        }
        if let Some(delay) = lookup("KEEPER_CONNECT_DELAY") {
            self.connect_delay = parse_duration("KEEPER_CONNECT_DELAY", &delay)?;
            info!("Connect delay overridden by environment: {}", delay);
        }
        if let Some(connect_timeout) = lookup("KEEPER_CONNECT_TIMEOUT") {
            self.connect_timeout = Some(parse_duration("KEEPER_CONNECT_TIMEOUT", &connect_timeout)?);
            info!("Connect timeout overridden by environment: {}", connect_timeout);
        }
        Ok(())
    }

    /// Parsed and shuffled server list
    pub fn addresses(&self) -> Result<AddressList> {
        Ok(AddressList::from_list(&self.servers)?)
    }

    /// Session settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout: self.timeout,
            connect_delay: self.connect_delay,
            connect_timeout: self.connect_timeout,
            max_frame_size: self.max_frame_size,
        }
    }
}
