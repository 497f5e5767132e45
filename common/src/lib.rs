//! Watchkeeper Common Types
//!
//! This crate contains shared types used across Watchkeeper, including
//! node identifiers, cluster snapshots, watch service states and the
//! administrative command set.

pub mod cluster;
pub mod command;
pub mod error;
pub mod identifiers;
pub mod state;

pub use cluster::*;
pub use command::*;
pub use error::*;
pub use identifiers::*;
pub use state::*;
