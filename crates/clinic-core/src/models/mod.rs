//! Domain models for the clinic scheduling system.

mod appointment;
mod patient;
mod provider;
mod reminder;

pub use appointment::*;
pub use patient::*;
pub use provider::*;
pub use reminder::*;
