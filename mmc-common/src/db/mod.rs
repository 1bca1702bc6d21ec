//! Database schema, connection setup and models

pub mod init;
pub mod migrations;
pub mod models;

pub use init::{init_database, init_in_memory};
pub use migrations::run_migrations;
pub use models::*;
