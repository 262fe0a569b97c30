//! CLI subcommands.

pub mod config;
pub mod load;
pub mod output;
pub mod start;
