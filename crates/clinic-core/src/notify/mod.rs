//! Outbound patient notifications.
//!
//! - `gateway`: channel dispatch with simulated fallback
//! - `log`: communication log sinks
//! - `twilio`: SMS provider client
//! - `smtp`: email transport
//! - `templates`: message text

mod gateway;
mod log;
mod smtp;
pub mod templates;
mod twilio;

pub use gateway::*;
pub use log::*;
pub use smtp::*;
pub use twilio::*;
