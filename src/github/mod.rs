//! GitHub REST API
//!
//! Typed client for the repository endpoints the dashboard uses.
//! Every call carries the session's bearer token.

mod client;
mod error;
mod models;

pub use client::GitHubClient;
pub use error::{GitHubError, Result};
pub use models::*;
