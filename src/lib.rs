// ABOUTME: Library module for supabase-table-migrator
// ABOUTME: Exports the migration engine and its collaborators for the binary and tests

pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod destination;
pub mod error;
pub mod filters;
pub mod interactive;
pub mod logging;
pub mod migration;
pub mod postgres;
pub mod progress;
pub mod retry;
pub mod source;
pub mod utils;
pub mod value;
