//! Common types shared across Huddle components.

#![warn(clippy::pedantic)]

/// Module for identifier types
pub mod types;

/// Module for common configuration
pub mod config;
