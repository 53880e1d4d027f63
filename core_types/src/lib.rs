//! # Core Types
//!
//! Fundamental identifiers shared by the file system crates.
//!
//! ## Key Types
//!
//! - [`ContextId`]: Unique identifier for an execution context

pub mod ids;
mod uuid_tools;

pub use ids::ContextId;
pub use uuid_tools::new_uuid;
