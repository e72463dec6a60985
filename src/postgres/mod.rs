// ABOUTME: PostgreSQL source support
// ABOUTME: Connection setup and the catalog/row reader used as the migration source

pub mod connection;
pub mod reader;

pub use connection::connect;
pub use reader::PostgresSource;
