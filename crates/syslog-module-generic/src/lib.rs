// # Generic Modules
//
// This crate provides two general-purpose modules for the syslog collector:
//
// - `generic` parser: splits the message text on single spaces, one field per token
// - `jsonl` storer: appends each record as a JSON array on its own line to the
//   file named by the handler's connection string
//
// The two are independent; any parser can be paired with the `jsonl` storer.
//
// ## Trust Level: Untrusted (Modules)
//
// **Allowed Capabilities**:
// - ✅ Parser: inspect the decoded message, build fields
// - ✅ Storer: append to its own file
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Retry a failed batch (the collector drops it)
// - ❌ Access the buffer or other handlers' modules
//
// ## File Format
//
// ```text
// ["Oct","11","su:","failure"]
// ["link","down"]
// ```
//
// Each flush appends its batch in enqueue order. The file is created if missing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use syslog_core::traits::{
    ParsedRecord, Parser, ParserFactory, Storer, StorerFactory, StorerSettings,
};
use syslog_core::{DecodedMessage, ModuleRegistry, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Registered name of [`GenericParser`]
pub const GENERIC_PARSER: &str = "generic";

/// Registered name of [`JsonLinesStorer`]
pub const JSONL_STORER: &str = "jsonl";

/// Parser splitting the message text on single spaces
///
/// Consecutive spaces produce empty fields, so field positions stay stable
/// for fixed-layout vendor formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericParser;

impl Parser for GenericParser {
    fn parse(&self, message: &DecodedMessage) -> Result<Option<ParsedRecord>> {
        Ok(Some(message.text().split(' ').map(str::to_string).collect()))
    }

    fn module_name(&self) -> &'static str {
        GENERIC_PARSER
    }
}

/// Factory for the generic parser
pub struct GenericParserFactory;

impl ParserFactory for GenericParserFactory {
    fn create(&self) -> Result<Box<dyn Parser>> {
        Ok(Box::new(GenericParser))
    }
}

/// Storer appending one JSON array per record to a file
#[derive(Debug)]
pub struct JsonLinesStorer {
    path: PathBuf,

    /// Serializes appends from overlapping flushes
    write_lock: Mutex<()>,
}

impl JsonLinesStorer {
    /// Create a storer writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(batch: &[ParsedRecord]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for record in batch {
            serde_json::to_writer(&mut out, record)?;
            out.push(b'\n');
        }
        Ok(out)
    }

    async fn append(&self, bytes: &[u8]) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

#[async_trait]
impl Storer for JsonLinesStorer {
    async fn store_messages(&self, batch: &[ParsedRecord]) -> Result<bool> {
        let bytes = Self::encode(batch)?;

        match self.append(&bytes).await {
            Ok(()) => {
                tracing::debug!("Appended {} records to {}", batch.len(), self.path.display());
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Failed to append to {}: {}", self.path.display(), e);
                Ok(false)
            }
        }
    }

    fn module_name(&self) -> &'static str {
        JSONL_STORER
    }
}

/// Factory for the jsonl storer
///
/// The handler's connection string is the output file path and is required.
pub struct JsonLinesStorerFactory;

impl StorerFactory for JsonLinesStorerFactory {
    fn create(&self, settings: &StorerSettings) -> Result<Box<dyn Storer>> {
        let path = settings.require_connection_string(JSONL_STORER)?;
        Ok(Box::new(JsonLinesStorer::new(path)))
    }
}

/// Register the generic parser and jsonl storer with a registry
///
/// # Example
///
/// ```rust
/// use syslog_core::ModuleRegistry;
///
/// let registry = ModuleRegistry::new();
/// syslog_module_generic::register(&registry);
/// assert!(registry.has_parser("generic"));
/// ```
pub fn register(registry: &ModuleRegistry) {
    registry.register_parser(GENERIC_PARSER, Box::new(GenericParserFactory));
    registry.register_storer(JSONL_STORER, Box::new(JsonLinesStorerFactory));
}
