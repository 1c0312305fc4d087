//! Module interfaces for the syslog collector
//!
//! This module defines the abstract interfaces that handler modules implement.
//!
//! - [`Parser`]: Turn a decoded message into an ordered list of fields
//! - [`Storer`]: Persist batches of parsed records

pub mod parser;
pub mod storer;

pub use parser::{ParsedRecord, Parser, ParserFactory};
pub use storer::{Storer, StorerFactory, StorerSettings};
