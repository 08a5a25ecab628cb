// ABOUTME: PostgreSQL backend for the export row source
// ABOUTME: Connection setup plus catalog and COPY-based row reading

pub mod connection;
pub mod reader;

pub use connection::{connect, connect_with_retry};
pub use reader::PostgresSource;
