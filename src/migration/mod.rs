// ABOUTME: Batch migration engine
// ABOUTME: Schema inspection and creation, duplicate resolution, table and run orchestration

pub mod ddl;
pub mod driver;
pub mod resolver;
pub mod schema;
pub mod table;

pub use ddl::materialize;
pub use driver::{check_connectivity, discover_tables, run_migration, RunError, RunSummary};
pub use resolver::{resolve_batch, BatchDelta};
pub use schema::{inspect_table, TableDescriptor, TableStructure};
pub use table::{migrate_table, MigrationContext, TableOutcome};
