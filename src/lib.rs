#![allow(clippy::arc_with_non_send_sync)]

pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod global;

pub use error::MicTestError;
