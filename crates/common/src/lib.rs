//! Shared types for the session harvester workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
