// # Storer Trait
//
// Defines the interface for persisting batches of parsed records.
//
// ## Implementations
//
// - In-memory: `syslog_core::store::MemoryStorer`
// - Line-delimited JSON files: `syslog-module-generic` crate
// - Future: relational database writers
//
// ## Usage
//
// ```rust,ignore
// use syslog_core::Storer;
//
// let storer = /* Storer implementation */;
//
// let batch = vec![vec!["a".to_string(), "b".to_string()]];
// if !storer.store_messages(&batch).await? {
//     // batch is dropped by the collector
// }
// ```

use async_trait::async_trait;

use super::parser::ParsedRecord;

/// Settings passed to a storer factory at construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorerSettings {
    /// Id of the handler the storer is built for
    pub handler_id: String,
    /// Backend connection string, if the handler configures one
    pub connection_string: Option<String>,
}

impl StorerSettings {
    /// Connection string, or a construction error naming `module` if missing
    pub fn require_connection_string(&self, module: &str) -> Result<&str, crate::Error> {
        self.connection_string
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                crate::Error::construction(
                    module,
                    format!("handler {} has no connection string", self.handler_id),
                )
            })
    }
}

/// Trait for storer module implementations
///
/// A storer receives every batch flushed for its handler, in enqueue order.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O against its backend
/// - ✅ Take as long as it needs; flushes run outside every buffer lock
///
/// ## Forbidden Capabilities
/// - ❌ Retrying internally across flush cycles (the collector is at-most-once)
/// - ❌ Holding on to the batch after returning
///
/// ## Failure Semantics
///
/// `Ok(false)` and `Err(_)` are treated the same: the batch is dropped and a
/// warning is logged. Expected backend failures should return `Ok(false)`.
#[async_trait]
pub trait Storer: Send + Sync {
    /// Persist one batch
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Batch stored
    /// - `Ok(false)`: Batch not stored
    /// - `Err(Error)`: Unexpected failure, handled like `Ok(false)`
    async fn store_messages(&self, batch: &[ParsedRecord]) -> Result<bool, crate::Error>;

    /// Module name (for logging/debugging)
    fn module_name(&self) -> &'static str;
}

/// Helper trait for constructing storers by registered name
pub trait StorerFactory: Send + Sync {
    /// Create a Storer instance
    ///
    /// # Parameters
    ///
    /// - `settings`: Handler id and connection string
    fn create(&self, settings: &StorerSettings) -> Result<Box<dyn Storer>, crate::Error>;
}
