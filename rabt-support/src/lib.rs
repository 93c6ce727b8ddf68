//! # Rabt Support
//!
//! Shared helpers for the rabt IoC container.
//!
//! This crate provides:
//! - Text rendering for error messages and startup plans

pub mod rendering;
