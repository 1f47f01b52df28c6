//! Domain logic shared by the assistant crates.
//!
//! Everything here is transport-free: workflow graph parsing and parameter
//! injection, generation parameter validation, transcript types, and the
//! workflow template loader.

pub mod chat;
pub mod error;
pub mod generation;
pub mod template;
pub mod types;
pub mod workflow;
