//! Shared building blocks for gopherbot: the Messenger wire model, runtime
//! configuration and the per-process bot state.

pub mod config;
pub mod state;
pub mod types;
