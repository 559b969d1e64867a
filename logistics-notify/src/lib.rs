//! logistics-notify library crate.
//!
//! Multi-channel notification dispatch (chat, email, realtime push) and the
//! scheduler that drives periodic reports and channel health checks.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod panic_hook;
pub mod scheduler;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
