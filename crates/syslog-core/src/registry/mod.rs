//! Plugin-based module registry
//!
//! The registry maps parser and storer module names to factories, and owns the
//! per-handler cache of constructed modules.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use syslog_core::registry::ModuleRegistry;
//! use syslog_core::config::HandlerConfig;
//!
//! // Create a registry
//! let registry = ModuleRegistry::new();
//!
//! // Register modules
//! registry.register_parser("generic", Box::new(GenericParserFactory));
//! registry.register_storer("jsonl", Box::new(JsonLinesStorerFactory));
//!
//! // Resolve modules for a handler (constructed once, then cached)
//! let handler = HandlerConfig::new("fw").with_parser("generic");
//! let parser = registry.resolve_parser(&handler)?;
//! ```
//!
//! ## Registration
//!
//! Module crates should register themselves during initialization:
//!
//! ```rust,ignore
//! # use syslog_core::registry::ModuleRegistry;
//!
//! // In syslog-module-generic crate
//! pub fn register(registry: &ModuleRegistry) {
//!     registry.register_parser("generic", Box::new(GenericParserFactory));
//! }
//! ```
//!
//! ## Resolution Cache
//!
//! Successful constructions are cached per handler id. Failures are not cached:
//! the next message routed to the handler tries again, so a module that becomes
//! constructible later (for example, once its backend is reachable) is picked
//! up without a restart.
//!
//! Factories run outside the cache lock. If two callers construct a module for
//! the same handler at once, the first one stored wins and both get it.

use crate::config::HandlerConfig;
use crate::error::{Error, Result};
use crate::traits::{Parser, ParserFactory, Storer, StorerFactory, StorerSettings};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Modules constructed for one handler
#[derive(Default)]
struct ResolvedModules {
    parser: Option<Arc<dyn Parser>>,
    storer: Option<Arc<dyn Storer>>,
}

/// Module registry for plugin-based parser and storer creation
///
/// ## Thread Safety
///
/// Factory maps use `RwLock`, allowing concurrent lookups and exclusive
/// registration. The resolution cache is behind a `Mutex` so that at most one
/// construction per handler is in flight.
#[derive(Default)]
pub struct ModuleRegistry {
    /// Registered parser factories
    parsers: RwLock<HashMap<String, Box<dyn ParserFactory>>>,

    /// Registered storer factories
    storers: RwLock<HashMap<String, Box<dyn StorerFactory>>>,

    /// Constructed modules by handler id
    resolved: Mutex<HashMap<String, ResolvedModules>>,
}

impl ModuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser factory
    ///
    /// # Parameters
    ///
    /// - `name`: Module name referenced by `HandlerConfig::parser`
    /// - `factory`: Factory object for creating parser instances
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_parser(&self, name: impl Into<String>, factory: Box<dyn ParserFactory>) {
        let mut parsers = self.parsers.write().unwrap_or_else(PoisonError::into_inner);
        parsers.insert(name.into(), factory);
    }

    /// Register a storer factory
    ///
    /// # Parameters
    ///
    /// - `name`: Module name referenced by `HandlerConfig::storer`
    /// - `factory`: Factory object for creating storer instances
    pub fn register_storer(&self, name: impl Into<String>, factory: Box<dyn StorerFactory>) {
        let mut storers = self.storers.write().unwrap_or_else(PoisonError::into_inner);
        storers.insert(name.into(), factory);
    }

    /// Create a parser by module name, bypassing the cache
    pub fn create_parser(&self, name: &str) -> Result<Box<dyn Parser>> {
        let parsers = self.parsers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = parsers
            .get(name)
            .ok_or_else(|| Error::module_not_found(format!("parser '{}'", name)))?;

        factory.create()
    }

    /// Create a storer by module name, bypassing the cache
    pub fn create_storer(&self, name: &str, settings: &StorerSettings) -> Result<Box<dyn Storer>> {
        let storers = self.storers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = storers
            .get(name)
            .ok_or_else(|| Error::module_not_found(format!("storer '{}'", name)))?;

        factory.create(settings)
    }

    /// Resolve the parser for a handler
    ///
    /// # Returns
    ///
    /// - `Ok(None)`: The handler configures no parser
    /// - `Ok(Some(parser))`: Cached or newly constructed parser
    /// - `Err(Error)`: Module not registered or construction failed (not cached)
    pub fn resolve_parser(&self, handler: &HandlerConfig) -> Result<Option<Arc<dyn Parser>>> {
        let Some(name) = handler.parser.as_deref() else {
            return Ok(None);
        };

        if let Some(parser) = self.cached(&handler.id, |slot| slot.parser.clone()) {
            return Ok(Some(parser));
        }

        let parser: Arc<dyn Parser> = Arc::from(self.create_parser(name)?);
        tracing::debug!(handler = %handler.id, module = name, "Parser constructed");

        let mut resolved = self.lock_resolved();
        let slot = resolved.entry(handler.id.clone()).or_default();
        Ok(Some(Arc::clone(slot.parser.get_or_insert(parser))))
    }

    /// Resolve the storer for a handler
    ///
    /// The storer is built with the handler's id and connection string.
    ///
    /// # Returns
    ///
    /// - `Ok(None)`: The handler configures no storer
    /// - `Ok(Some(storer))`: Cached or newly constructed storer
    /// - `Err(Error)`: Module not registered or construction failed (not cached)
    pub fn resolve_storer(&self, handler: &HandlerConfig) -> Result<Option<Arc<dyn Storer>>> {
        let Some(name) = handler.storer.as_deref() else {
            return Ok(None);
        };

        if let Some(storer) = self.cached(&handler.id, |slot| slot.storer.clone()) {
            return Ok(Some(storer));
        }

        let settings = StorerSettings {
            handler_id: handler.id.clone(),
            connection_string: handler.connection_string.clone(),
        };
        let storer: Arc<dyn Storer> = Arc::from(self.create_storer(name, &settings)?);
        tracing::debug!(handler = %handler.id, module = name, "Storer constructed");

        let mut resolved = self.lock_resolved();
        let slot = resolved.entry(handler.id.clone()).or_default();
        Ok(Some(Arc::clone(slot.storer.get_or_insert(storer))))
    }

    fn cached<T: ?Sized>(
        &self,
        handler_id: &str,
        pick: impl FnOnce(&ResolvedModules) -> Option<Arc<T>>,
    ) -> Option<Arc<T>> {
        self.lock_resolved().get(handler_id).and_then(pick)
    }

    fn lock_resolved(&self) -> std::sync::MutexGuard<'_, HashMap<String, ResolvedModules>> {
        self.resolved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// List all registered parser names
    pub fn list_parsers(&self) -> Vec<String> {
        let parsers = self.parsers.read().unwrap_or_else(PoisonError::into_inner);
        parsers.keys().cloned().collect()
    }

    /// List all registered storer names
    pub fn list_storers(&self) -> Vec<String> {
        let storers = self.storers.read().unwrap_or_else(PoisonError::into_inner);
        storers.keys().cloned().collect()
    }

    /// Check if a parser name is registered
    pub fn has_parser(&self, name: &str) -> bool {
        let parsers = self.parsers.read().unwrap_or_else(PoisonError::into_inner);
        parsers.contains_key(name)
    }

    /// Check if a storer name is registered
    pub fn has_storer(&self, name: &str) -> bool {
        let storers = self.storers.read().unwrap_or_else(PoisonError::into_inner);
        storers.contains_key(name)
    }
}
