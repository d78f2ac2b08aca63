#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod data;
pub mod detail;
pub mod listing;
pub mod logging;
pub mod markup;
pub mod media;
pub mod ui;
pub mod wordpress;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, Mode, RunOptions};
