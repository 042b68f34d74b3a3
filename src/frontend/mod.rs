//! Frontend components
//!
//! Configuration and the command-line interface of `jelly-infer`.

pub mod cli;
pub mod config;

pub use cli::main as cli_main;
pub use config::{CheckOptions, Config};
