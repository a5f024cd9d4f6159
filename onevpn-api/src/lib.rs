//! HTTP transport for the 1VPN backend.
//!
//! - [`ApiClient`]: attaches the session credential to every call and
//!   normalizes non-success responses into [`ApiError::Status`]
//! - [`Backend`]: the REST surface the client core consumes
//! - [`HttpBackend`]: `Backend` over `ApiClient`
//!
//! This crate never retries and never interprets error details; callers
//! decide what a given `detail` means.

mod backend;
mod client;
mod error;

pub use backend::{Backend, HttpBackend, InitAck, SubscriptionAck};
pub use client::{ApiClient, ApiConfig, DEFAULT_CREDENTIAL_HEADER};
pub use error::{ApiError, ApiResult};
pub use reqwest::Method;
