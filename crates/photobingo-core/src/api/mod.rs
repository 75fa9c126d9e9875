//! Remote data service access.
//!
//! The engine only reads through the `DataSource` trait. `ApiClient` is the
//! HTTP implementation used in production; tests substitute scripted sources.
//!
//! Errors are classified structurally by `ApiError::class`, so retry
//! decisions never depend on message text.

pub mod client;
pub mod error;
pub mod source;

pub use client::ApiClient;
pub use error::{ApiError, FailureClass};
pub use source::DataSource;
