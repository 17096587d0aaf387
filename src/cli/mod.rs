//! CLI module for promptloom - command-line interface and subcommands.
//!
//! Provides subcommands for expanding prompts against piece libraries and for running
//! batches of generation jobs through the task queue.

pub mod commands;

pub use commands::Cli;
