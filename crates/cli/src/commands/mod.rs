//! `ngctl` subcommands

pub mod config;
pub mod notify;
pub mod sample;
pub mod state;
pub mod status;
