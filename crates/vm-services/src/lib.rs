//! # vm-services
//!
//! Session state, the villa repository and dashboard statistics, written
//! against the `vm-core` ports only.

pub mod repository;
pub mod session;
pub mod stats;

pub use repository::{Dashboard, VillaRepository, DASHBOARD_RECENT};
pub use session::{SessionState, SessionSubscription};
pub use stats::{summarize, Tally, VillaStats};
