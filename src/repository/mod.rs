mod connection;
mod run_repository;

pub use connection::establish_connection;
pub use run_repository::MigrationRunRepository;

pub type DbPool = sqlx::SqlitePool;
