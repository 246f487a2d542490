//! Database initialization, migrations and settings access

pub mod init;
pub mod migrations;
pub mod settings;

pub use init::*;
pub use migrations::*;
pub use settings::*;
