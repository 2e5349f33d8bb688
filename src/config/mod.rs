//! Configuration loading and validation.
//!
//! - [`settings`] - Environment parsing into [`crate::models::settings::Settings`]
//! - [`validation`] - Boot-time range and consistency checks

pub mod settings;
pub mod validation;
