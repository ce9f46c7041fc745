//! Shared test fixtures.
//!
//! Real Las Vegas coordinates so distances and projections behave like
//! production data.

pub mod vegas_locations;
