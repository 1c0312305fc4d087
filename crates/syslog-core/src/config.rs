//! Configuration types for the syslog collector
//!
//! This module defines all configuration structures used throughout the crate.
//! Configuration is loaded once at startup and is immutable afterwards.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

/// Standard syslog UDP port, used for listening and as the forward port
pub const DEFAULT_PORT: u16 = 514;

/// Flush period used when none (or a non-positive one) is configured
pub const DEFAULT_FLUSH_INTERVAL_SECS: i64 = 30;

/// Largest UDP payload over IPv4
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 65_507;

/// Per-monitor queue depth on the notification bus
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Main collector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Socket and timing settings
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Handlers, in configuration order
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

impl CollectorConfig {
    /// Create a configuration with default listener settings and no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handler list
    pub fn with_handlers(mut self, handlers: Vec<HandlerConfig>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.listener.validate()?;

        let mut ids = HashSet::new();
        for handler in &self.handlers {
            handler.validate()?;
            if !ids.insert(handler.id.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate handler id: {}",
                    handler.id
                )));
            }
        }

        Ok(())
    }
}

/// Listener (socket and timing) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Literal IPv4 address to bind, or "any"
    #[serde(default = "default_address")]
    pub address: String,

    /// UDP port to bind (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between buffer flushes; values <= 0 use the default
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: i64,

    /// Receive buffer size; longer datagrams are truncated by the OS
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// Messages queued per monitor before further messages are skipped for it
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl ListenerConfig {
    /// Create a listener configuration for `address:port`
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the flush interval
    pub fn with_flush_interval_secs(mut self, secs: i64) -> Self {
        self.flush_interval_secs = secs;
        self
    }

    /// The address to bind, with "any" mapped to 0.0.0.0
    pub fn listen_ip(&self) -> Result<Ipv4Addr, crate::Error> {
        let address = self.address.trim();
        if address.eq_ignore_ascii_case("any") {
            return Ok(Ipv4Addr::UNSPECIFIED);
        }

        address.parse().map_err(|_| {
            crate::Error::config(format!(
                "Listen address '{}' is not an IPv4 literal or \"any\"",
                self.address
            ))
        })
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr, crate::Error> {
        Ok(SocketAddr::V4(SocketAddrV4::new(self.listen_ip()?, self.port)))
    }

    /// Effective flush period
    pub fn flush_period(&self) -> Duration {
        let secs = if self.flush_interval_secs > 0 {
            self.flush_interval_secs
        } else {
            DEFAULT_FLUSH_INTERVAL_SECS
        };
        Duration::from_secs(secs as u64)
    }

    /// Validate the listener configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.listen_ip()?;

        if self.max_datagram_size == 0 {
            return Err(crate::Error::config("max_datagram_size must be > 0"));
        }
        if self.subscriber_capacity == 0 {
            return Err(crate::Error::config("subscriber_capacity must be > 0"));
        }

        Ok(())
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            flush_interval_secs: default_flush_interval_secs(),
            max_datagram_size: default_max_datagram_size(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

/// One handler: a parser/storer pairing scoped to a set of source addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Unique handler id, the key for module resolution and buffering
    pub id: String,

    /// Registered parser module name
    #[serde(default)]
    pub parser: Option<String>,

    /// Registered storer module name
    #[serde(default)]
    pub storer: Option<String>,

    /// Connection string passed to the storer factory
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Sender addresses routed to this handler
    #[serde(default, deserialize_with = "address_list")]
    pub filter_addresses: Vec<String>,

    /// Collectors that receive a raw copy of every datagram from `filter_addresses`
    #[serde(default, deserialize_with = "address_list")]
    pub forward_addresses: Vec<String>,
}

impl HandlerConfig {
    /// Create a handler with no modules and no addresses
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parser: None,
            storer: None,
            connection_string: None,
            filter_addresses: Vec::new(),
            forward_addresses: Vec::new(),
        }
    }

    /// Set the parser module
    pub fn with_parser(mut self, name: impl Into<String>) -> Self {
        self.parser = Some(name.into());
        self
    }

    /// Set the storer module
    pub fn with_storer(mut self, name: impl Into<String>) -> Self {
        self.storer = Some(name.into());
        self
    }

    /// Set the storer connection string
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Set the filter addresses
    pub fn with_filter_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Set the forward addresses
    pub fn with_forward_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forward_addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Resolved forward destinations
    ///
    /// A bare address gets the standard syslog port.
    pub fn forward_targets(&self) -> Result<Vec<SocketAddr>, crate::Error> {
        self.forward_addresses
            .iter()
            .map(|address| parse_forward_target(address))
            .collect()
    }

    /// Validate the handler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.id.trim().is_empty() {
            return Err(crate::Error::config("Handler id cannot be empty"));
        }

        for address in &self.filter_addresses {
            if address.parse::<Ipv4Addr>().is_err() {
                return Err(crate::Error::config(format!(
                    "Handler {}: filter address '{}' is not an IPv4 literal",
                    self.id, address
                )));
            }
        }

        if self.filter_addresses.is_empty() && !self.forward_addresses.is_empty() {
            return Err(crate::Error::config(format!(
                "Handler {}: forward_addresses require at least one filter address",
                self.id
            )));
        }

        self.forward_targets()
            .map_err(|e| crate::Error::config(format!("Handler {}: {}", self.id, e)))?;

        Ok(())
    }
}

/// Load the handler list from a JSON file
///
/// The file holds a JSON array of handler objects. Address lists may be given
/// either as an array or as one comma/semicolon-separated string.
pub fn load_handlers(path: impl AsRef<Path>) -> Result<Vec<HandlerConfig>, crate::Error> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::config(format!(
            "Failed to read handler file {}: {}",
            path.display(),
            e
        ))
    })?;

    let handlers: Vec<HandlerConfig> = serde_json::from_str(&content).map_err(|e| {
        crate::Error::config(format!(
            "Failed to parse handler file {}: {}",
            path.display(),
            e
        ))
    })?;

    for handler in &handlers {
        handler.validate()?;
    }

    Ok(handlers)
}

/// Split a comma/semicolon-separated address list, dropping blanks
pub fn split_addresses(list: &str) -> Vec<String> {
    list.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_forward_target(address: &str) -> Result<SocketAddr, crate::Error> {
    if let Ok(target) = address.parse::<SocketAddrV4>() {
        return Ok(SocketAddr::V4(target));
    }

    address
        .parse::<Ipv4Addr>()
        .map(|ip| SocketAddr::new(IpAddr::V4(ip), DEFAULT_PORT))
        .map_err(|_| {
            crate::Error::config(format!(
                "forward address '{}' is not an IPv4 literal",
                address
            ))
        })
}

fn address_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AddressList {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match AddressList::deserialize(deserializer)? {
        AddressList::Joined(list) => split_addresses(&list),
        AddressList::List(items) => items.iter().flat_map(|s| split_addresses(s)).collect(),
    })
}

fn default_address() -> String {
    "any".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_flush_interval_secs() -> i64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

fn default_max_datagram_size() -> usize {
    DEFAULT_MAX_DATAGRAM_SIZE
}

fn default_subscriber_capacity() -> usize {
    DEFAULT_SUBSCRIBER_CAPACITY
}
