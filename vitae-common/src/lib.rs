//! Vitae Common - shared foundations for the Vitae services.
//!
//! This crate provides the pieces every Vitae service needs:
//! - Configuration loading with environment overrides
//! - Logging bootstrap with noise filtering
//! - User input sanitization and prompt-injection screening

#![warn(clippy::all)]

pub mod config;
pub mod logging;
pub mod sanitize;
