// Public modules
pub mod env;
pub mod error;
pub mod executor;
pub mod filter;
pub mod rake;
pub mod ssh;
pub mod target;
pub mod tasks;
pub mod transfer;

// Internal modules - not part of public API
pub(crate) mod config;
pub(crate) mod local_files;
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
