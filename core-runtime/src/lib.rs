//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the upload core:
//! - Logging and tracing bootstrap
//! - Upload configuration with fail-fast validation
//! - Event bus for observing the orchestrator
//!
//! ## Overview
//!
//! Nothing in this crate knows how uploads are scheduled. It establishes the
//! logging conventions, the configuration surface and the broadcast channel
//! through which `core-upload` publishes its state changes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
