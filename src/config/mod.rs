//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: The server descriptor and per-identity client config
//! - [`secret`]: Credential wrapper that never prints and zeroizes on drop
//! - [`validation`]: Startup validation of a server descriptor

mod secret;
mod types;
pub mod validation;

pub use secret::Secret;
pub use types::{ClientConfig, ConfigError, MembershipConfig, ServerConfig};
pub use validation::{ValidationError, validate};
