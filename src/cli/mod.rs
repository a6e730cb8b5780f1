//! CLI module for visitrack - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
