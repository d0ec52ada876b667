//! Cross-cutting utilities: configuration, error type, auth, and rate
//! limiting.

pub mod auth;
pub mod config;
pub mod error;
pub mod rate_limiter;

pub use config::Config;
pub use error::{WatchError, WatchResult};
