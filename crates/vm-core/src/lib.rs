//! villa-manager/crates/vm-core/src/lib.rs
//!
//! The central domain model and interface definitions for Villa Manager.

pub mod error;
pub mod models;
pub mod query;
pub mod session;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use query::*;
pub use session::*;
pub use traits::*;
