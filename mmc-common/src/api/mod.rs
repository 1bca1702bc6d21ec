//! API module for shared HTTP API functionality
//!
//! This module contains ONLY pure functions and shared types. mmc-api wraps
//! them with Axum middleware.

pub mod auth;

pub use auth::{parse_client_keys, ApiAuthError, ClientIdentity, ClientKeys, AUTH_EXEMPT_PATH};
