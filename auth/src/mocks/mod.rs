//! Mock token sources for testing.
//!
//! In-memory implementations of [`crate::providers::TokenSource`] for use in
//! unit and integration tests.

pub mod token_source;

pub use token_source::MockTokenSource;
