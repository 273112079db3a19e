// storage/mod.rs
// SQLite-backed Repository implementation

pub mod pool;
pub mod sqlite;

pub use pool::{init_db_pool, run_schema};
pub use sqlite::SqliteRepository;
