//! # Khidma Support
//!
//! Shared utilities for the Khidma DI crates.
//!
//! This crate provides:
//! - Source-location capture for registrations
//! - Text rendering for diagnostics and error messages

pub mod rendering;
pub mod stacktrace;
