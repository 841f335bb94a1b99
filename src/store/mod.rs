//! Storage backends. Each component defines its repository trait next to its
//! model; `PgStore` implements all of them over one pool and `MemoryStore`
//! keeps the same rules in process.

pub mod memory;

use sqlx::PgPool;

pub use memory::MemoryStore;

#[derive(Clone)]
pub struct PgStore {
    pub db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}
