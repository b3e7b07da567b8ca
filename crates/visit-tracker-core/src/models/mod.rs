//! Domain models for the visit tracker.

mod input;
mod patient;

pub use input::*;
pub use patient::*;
