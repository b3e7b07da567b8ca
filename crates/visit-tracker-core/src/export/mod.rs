//! Export functionality for patient lists.

mod patients;

pub use patients::*;
