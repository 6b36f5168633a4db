//! Core domain + application logic for the heart-rate zone bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind the
//! messaging port implemented in the adapter crate.

pub mod audit;
pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod replies;
pub mod session;
pub mod validation;
pub mod zones;

pub use errors::{Error, Result};
