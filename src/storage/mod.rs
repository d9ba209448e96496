//! Storage Layer
//!
//! Handles data persistence: the JSON settings file.

pub mod config;

pub use config::*;
