//! Persistent registry of named vector stores.
//!
//! Tracks multiple collections under unique names so a user can switch
//! between narrative sources without juggling file paths. The catalog and
//! the default-store pointer live under an injected root directory, so tests
//! and independent processes get isolated instances.
//!
//! # Main types
//!
//! - [`StoreRegistry`] — The catalog: register, look up, rename, delete,
//!   list, and default-store resolution.

/// The store catalog and its persistence.
pub mod registry;

pub use registry::{StoreRegistry, DEFAULT_NAME};
