//! The `utils` module provides definitions shared across the `orderflow` crate.
//!
//! It centralizes the error taxonomy used by every component and the
//! tracing setup used by the binary and the tests.

pub mod error;
pub mod logging;

pub use error::BusError;
