pub mod migration;
pub mod run;

pub use migration::{DataStructureInfo, DataStructureMigrationStatus, OverallMigrationStatus, Status};
pub use run::{MigrationRun, RunOutcome};
