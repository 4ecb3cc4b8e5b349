//! Core domain + application logic for the registration bot.
//!
//! Framework-agnostic: the spreadsheet backend, the messenger and mail
//! delivery live behind ports (traits) implemented in adapter crates.

pub mod bot;
pub mod config;
pub mod connection;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod mail;
pub mod messaging;
pub mod registry;
pub mod state;
pub mod table;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
