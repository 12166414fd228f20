//! Postgres persistence for the research pipeline, plus an in-memory store
//! used by engine tests.

pub mod memory;
pub mod records;
pub mod traits;

mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use records::*;
pub use traits::*;
