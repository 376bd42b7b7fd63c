//! The `retry` module holds the backoff policy shared by every operation that
//! may transiently fail: connecting, publishing and subscribing.
//!
//! A single `BackoffPolicy` value is built from configuration and handed to
//! each component that needs it.

pub mod backoff;

pub use backoff::BackoffPolicy;

#[cfg(test)]
mod tests;
