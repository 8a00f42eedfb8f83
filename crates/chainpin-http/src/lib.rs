//! chainpin-http — connector management API client with retry.

pub mod client;
pub mod config;
pub mod retry;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{rest_error, HttpRestClient, Method, RestClient, RestRequest, RestResponse};
pub use config::{BasicAuth, HttpConfig};
pub use retry::{RetryConfig, RetryPolicy};
