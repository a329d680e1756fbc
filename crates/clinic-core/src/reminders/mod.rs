//! Three-stage reminder sequence.
//!
//! Each booking gets `initial`, `form_check` and `confirmation` reminders at
//! fixed offsets before the start. A pending reminder is dispatched once due;
//! `sent` flips when any channel succeeds and never reverts.

mod queue;
mod scheduler;
mod worker;

pub use queue::*;
pub use scheduler::*;
pub use worker::*;
