// # syslog-core
//
// Core library for the syslog collector.
//
// ## Architecture Overview
//
// This library provides the collector's receive, route and store pipeline:
// - **codec**: RFC 3164 datagram decoding into `DecodedMessage`
// - **Parser / Storer**: Traits implemented by pluggable modules
// - **ModuleRegistry**: Name-to-factory registry with a per-handler resolution cache
// - **DispatchTable**: Sender address → handler and forward targets
// - **FlushBuffer**: Per-handler queues drained periodically into storers
// - **NotificationBus**: Live feed of every decoded message for monitors
// - **Receiver**: Owns the socket and ties everything together
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from module implementations
// 2. **Plugin-Based**: Parsers and storers are configured by name, no hard-coded if-else
// 3. **Library-First**: The daemon is a thin wrapper; everything can be embedded
// 4. **Availability over Durability**: Failures are logged and skipped, never fatal at runtime

pub mod buffer;
pub mod bus;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod receiver;
pub mod registry;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use buffer::{FlushBuffer, FlushReport};
pub use bus::{NotificationBus, Subscription, SubscriptionId};
pub use codec::{DecodedMessage, Facility, Severity};
pub use config::{CollectorConfig, HandlerConfig, ListenerConfig};
pub use error::{Error, Result};
pub use receiver::{Receiver, ReceiverState};
pub use registry::ModuleRegistry;
pub use store::MemoryStorer;
pub use traits::{ParsedRecord, Parser, ParserFactory, Storer, StorerFactory, StorerSettings};
