//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper, history parsing and artifact URL
//! construction, and [`generation::GenerationClient`], which submits an
//! injected workflow and polls until an image is produced or the poll
//! budget runs out.

pub mod api;
pub mod generation;
pub mod history;
