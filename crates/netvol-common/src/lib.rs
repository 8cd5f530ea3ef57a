//! # netvol-common
//!
//! Shared types for the netvol volume driver:
//! - Common error types
//! - Standard filesystem paths and host directory naming

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{NetvolError, NetvolResult};
pub use paths::{NetvolPaths, volume_name};
