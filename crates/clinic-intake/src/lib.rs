//! Patient intake validation for the scheduling core.
//!
//! This crate turns the JSON emitted by an upstream intake extractor into a
//! validated record that the patient directory can resolve or register.

pub mod extraction;

pub use extraction::*;
