// # Memory Storer
//
// In-memory implementation of Storer.
//
// ## Purpose
//
// Keeps every stored batch in a Vec so embedding code and tests can look at
// exactly what a handler flushed. Nothing survives a restart.
//
// ## When to Use
//
// - Testing environments
// - Embedding the collector and consuming batches in-process
// - Dry runs of a handler configuration before wiring a real backend

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::{ParsedRecord, Storer, StorerFactory, StorerSettings};

/// Module name the memory storer registers under
pub const MEMORY_STORER: &str = "memory";

/// In-memory storer implementation
///
/// Clones share the same storage.
///
/// # Example
///
/// ```rust,no_run
/// use syslog_core::store::MemoryStorer;
/// use syslog_core::Storer;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let storer = MemoryStorer::new();
///
///     storer.store_messages(&[vec!["a".to_string()]]).await?;
///     assert_eq!(storer.record_count().await, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStorer {
    batches: Arc<RwLock<Vec<Vec<ParsedRecord>>>>,
}

impl MemoryStorer {
    /// Create a new empty memory storer
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored batches, oldest first
    pub async fn batches(&self) -> Vec<Vec<ParsedRecord>> {
        self.batches.read().await.clone()
    }

    /// All stored records, flattened in store order
    pub async fn records(&self) -> Vec<ParsedRecord> {
        self.batches.read().await.iter().flatten().cloned().collect()
    }

    /// Number of stored records
    pub async fn record_count(&self) -> usize {
        self.batches.read().await.iter().map(Vec::len).sum()
    }

    /// Discard everything stored so far
    pub async fn clear(&self) {
        self.batches.write().await.clear();
    }
}

#[async_trait]
impl Storer for MemoryStorer {
    async fn store_messages(&self, batch: &[ParsedRecord]) -> Result<bool, Error> {
        self.batches.write().await.push(batch.to_vec());
        Ok(true)
    }

    fn module_name(&self) -> &'static str {
        MEMORY_STORER
    }
}

/// Factory handing out one shared [`MemoryStorer`]
///
/// Every handler configured with the memory storer writes into the same
/// storage, reachable through [`MemoryStorerFactory::storer`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStorerFactory {
    storer: MemoryStorer,
}

impl MemoryStorerFactory {
    /// Create a factory around an existing storer
    pub fn new(storer: MemoryStorer) -> Self {
        Self { storer }
    }

    /// The shared storer
    pub fn storer(&self) -> &MemoryStorer {
        &self.storer
    }
}

impl StorerFactory for MemoryStorerFactory {
    fn create(&self, _settings: &StorerSettings) -> Result<Box<dyn Storer>, Error> {
        Ok(Box::new(self.storer.clone()))
    }
}
