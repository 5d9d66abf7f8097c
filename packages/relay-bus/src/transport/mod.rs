//! Transport implementations shipped with the runtime.

pub mod memory;

pub use memory::MemoryTransport;
