//! Shared types for the Relay agent backend: structured API errors,
//! credential helpers (password hashing, JWT), and configuration models
//! for the pluggable service and tool layers.

pub mod auth;
pub mod config;
pub mod error;
pub mod tools;
