//! Storage backends shared by the chapter cache and the strip library.
//!
//! Everything above this crate addresses storage by *relative* paths. A
//! backend owns its root, fixed at construction, and every path handed to it
//! is validated so it can never escape that root.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::{validate as validate_path, validate_component};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
