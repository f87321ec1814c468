//! Subcommand implementations.

pub mod config;
pub mod login;
pub mod token;
