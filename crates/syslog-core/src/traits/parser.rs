// # Parser Trait
//
// Defines the interface for turning a decoded syslog message into an
// ordered list of string fields for storage.
//
// ## Implementations
//
// - Generic whitespace splitter: `syslog-module-generic` crate
// - Vendor-specific formats live in their own module crates
//
// ## Usage
//
// ```rust,ignore
// use syslog_core::Parser;
//
// let parser = /* Parser implementation */;
//
// match parser.parse(&message)? {
//     Some(fields) => println!("{} fields", fields.len()),
//     None => println!("not a message this parser understands"),
// }
// ```

use crate::codec::DecodedMessage;

/// One parsed message: an ordered list of fields
///
/// The field layout is a contract between a parser and the storer it is
/// paired with. The collector never inspects it.
pub type ParsedRecord = Vec<String>;

/// Trait for parser module implementations
///
/// A parser is resolved once per handler and then called from the receive
/// loop for every message routed to that handler.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by the
/// receive loop for the lifetime of the process.
///
/// # Trust Level: Untrusted
///
/// Parsers run inline on the receive path.
///
/// ## Allowed Capabilities
/// - ✅ Inspect the message and build fields
/// - ✅ Return `Ok(None)` for messages they do not understand
///
/// ## Forbidden Capabilities
/// - ❌ Blocking I/O (stalls ingestion for every sender)
/// - ❌ Buffering or storing records (owned by `FlushBuffer` and `Storer`)
/// - ❌ Spawning tasks
pub trait Parser: Send + Sync {
    /// Parse one message
    ///
    /// # Returns
    ///
    /// - `Ok(Some(fields))`: Parsed record, enqueued if non-empty and a storer is configured
    /// - `Ok(None)`: Message not understood; it skips the storage path
    /// - `Err(Error)`: Parse failure; logged, message skips the storage path
    fn parse(&self, message: &DecodedMessage) -> Result<Option<ParsedRecord>, crate::Error>;

    /// Module name (for logging/debugging)
    fn module_name(&self) -> &'static str;
}

/// Helper trait for constructing parsers by registered name
pub trait ParserFactory: Send + Sync {
    /// Create a Parser instance
    ///
    /// # Returns
    ///
    /// A boxed Parser trait object, or a construction error
    fn create(&self) -> Result<Box<dyn Parser>, crate::Error>;
}
