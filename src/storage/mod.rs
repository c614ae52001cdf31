pub mod sqlite;

pub use sqlite::SqliteCacheStorage;
