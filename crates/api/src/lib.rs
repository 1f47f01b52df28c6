//! Assistant API server library.
//!
//! Exposes the building blocks (config, state, sessions, chat providers,
//! routes) so integration tests and the binary entrypoint can both access
//! them.

pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod session;
pub mod state;
