//! Utility types and functions

pub mod config;
pub mod diagnostic;
pub mod loader;
pub mod logger;
pub mod span;
