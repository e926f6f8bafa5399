// Public modules
pub mod build;
pub mod build_info;
pub mod cabinet;
pub mod catalog;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod release;
pub mod schema;
pub mod verify;

// Internal modules - not part of public API
pub(crate) mod db;

// Public modules for CLI access
pub mod defaults;
pub mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
