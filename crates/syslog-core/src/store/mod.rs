// # Storer Implementations
//
// Storers that ship with the core. Backend-specific storers live in their
// own module crates and register through `ModuleRegistry`.

pub mod memory;

pub use memory::{MEMORY_STORER, MemoryStorer, MemoryStorerFactory};
