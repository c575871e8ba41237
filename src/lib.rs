pub mod config;
pub mod endpoint;
pub mod error;
pub mod git;
pub mod mirror;
pub mod refs;
pub mod secret;
pub mod trigger;

pub use error::{MirrorError, Result};
