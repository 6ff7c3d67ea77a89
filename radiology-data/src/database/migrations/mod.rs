// Database migrations module
// Only SQLite is supported; the schema mirrors the hosted store's tables
// that this service reads and writes.

mod sqlite;
pub use sqlite::run_migrations as run_sqlite_migrations;
