//! Underlying data accessors the scoped layer wraps.

pub mod memory;

pub use memory::*;
