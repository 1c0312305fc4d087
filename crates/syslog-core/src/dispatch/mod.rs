//! Source-address routing
//!
//! The dispatch table is built once from the ordered handler list and answers
//! two independent questions for every sender: where to forward the raw
//! datagram, and which handler (if any) parses and stores it.

use crate::config::HandlerConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Routing decision for one sender
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    /// Collectors that receive a raw copy of the datagram
    pub forwards: &'a [SocketAddr],
    /// Handler that parses and stores the message
    pub handler: Option<&'a Arc<HandlerConfig>>,
}

impl Route<'_> {
    /// True if the sender is neither forwarded nor handled
    pub fn is_empty(&self) -> bool {
        self.forwards.is_empty() && self.handler.is_none()
    }
}

/// Filter and forward maps keyed by literal sender address
#[derive(Debug, Default)]
pub struct DispatchTable {
    filters: HashMap<String, Arc<HandlerConfig>>,
    forwards: HashMap<String, Vec<SocketAddr>>,
}

impl DispatchTable {
    /// Build the table from handlers in configuration order
    ///
    /// When two handlers list the same filter address, the later one wins for
    /// both maps. Forward entries exist only for addresses whose handler has
    /// forward targets.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a forward address is malformed.
    pub fn build(handlers: &[HandlerConfig]) -> Result<Self> {
        let mut table = Self::default();

        for handler in handlers {
            let targets = handler.forward_targets()?;
            let shared = Arc::new(handler.clone());

            for address in &handler.filter_addresses {
                if let Some(previous) = table.filters.insert(address.clone(), Arc::clone(&shared))
                {
                    tracing::warn!(
                        address = %address,
                        replaced = %previous.id,
                        handler = %handler.id,
                        "Filter address listed by more than one handler, last one wins"
                    );
                }

                if targets.is_empty() {
                    table.forwards.remove(address);
                } else {
                    table.forwards.insert(address.clone(), targets.clone());
                }
            }
        }

        Ok(table)
    }

    /// Route a message by its sender address
    pub fn route(&self, sender: &str) -> Route<'_> {
        Route {
            forwards: self.forwards.get(sender).map(Vec::as_slice).unwrap_or(&[]),
            handler: self.filters.get(sender),
        }
    }

    /// True if any sender has forward targets
    pub fn has_forwards(&self) -> bool {
        !self.forwards.is_empty()
    }

    /// Number of filtered sender addresses
    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }
}
