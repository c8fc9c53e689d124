//! # nut-common
//!
//! Shared types for the nut image builder:
//! - Error taxonomy and result alias
//! - Validated container names
//! - LXC filesystem layout

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod paths;

pub use error::{NutError, NutResult};
pub use id::ContainerName;
pub use paths::NutPaths;
