//! Export functionality for appointment reporting.

mod appointments;

pub use appointments::*;
