pub mod cli;
pub mod commands;
pub mod manifest;

pub use cli::{Cli, Commands, OutputFormat};
