// ticketcore_server/src/db/mod.rs

pub mod pg_store;
pub mod rows;
pub mod seed;

pub use pg_store::PgStore;
