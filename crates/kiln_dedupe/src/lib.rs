//! Single-flight work deduplication.
//!
//! Concurrent requests for the same key share one execution: the first caller
//! runs the work and every caller that arrives while it is in flight receives
//! a clone of the same outcome. [`WorkDeduper`] blocks waiting threads;
//! [`AsyncWorkDeduper`] suspends waiting tasks.

#![warn(missing_docs)]

pub mod blocking;
pub mod error;
mod flight;
pub mod suspending;

pub use blocking::WorkDeduper;
pub use error::DedupeError;
pub use flight::Retention;
pub use suspending::AsyncWorkDeduper;
