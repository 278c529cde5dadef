//! Shared data model for devlink.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: the self-describing [`DeviceId`], the canonical [`DeviceDescriptor`]
//! produced by discovery, the [`Meta`] record threaded through a device job,
//! and the environment-driven [`LinkConfig`].

pub mod config;
pub mod constants;
pub mod error;
pub mod meta;
pub mod types;

pub use config::LinkConfig;
pub use error::{Error, Result};
pub use meta::Meta;
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
