//! Slot availability and the booking ledger.

mod availability;
mod ledger;

pub use availability::*;
pub use ledger::*;
