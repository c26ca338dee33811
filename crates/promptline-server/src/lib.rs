//! Promptline server library - HTTP adapter over the session registry.
//!
//! Routes, configuration, logging and application state live here, separate
//! from main.rs, so the router can be driven directly in integration tests.

pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod reaper;
pub mod routes;
pub mod state;
