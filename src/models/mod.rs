//! Data Models
//!
//! Contains the persisted settings and the types derived from them.

pub mod settings;

pub use settings::*;
