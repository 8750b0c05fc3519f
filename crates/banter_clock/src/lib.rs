//! # Banter Clock
//!
//! Vector clock primitives for Banter's multi-device sync core.
//!
//! This crate provides:
//! - `VectorClock` for per-device causal counters
//! - `ClockOrdering` for partial-order comparison
//! - Canonical string serialization with exact round trip
//!
//! This is a pure algebra crate with no I/O operations. Every mutator
//! returns a new clock; a `VectorClock` value is never modified in place.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;

pub use clock::{ClockOrdering, VectorClock};
pub use error::{ClockError, ClockResult};
