//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - expand: expand piece references in a prompt and print samples
//! - combine: interleave front/middle/back phrase lists, then expand
//! - check: bracket balance check
//! - run: run a batch of generation jobs
//! - libraries: list loaded piece libraries

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Promptloom - prompt template expansion and paced image generation queue
#[derive(Parser, Debug)]
#[command(name = "promptloom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expand piece references in a prompt and print lowered samples
    Expand {
        /// Comma separated prompt, e.g. "1girl, <char.alice>"
        prompt: String,

        /// Number of samples to lower
        #[arg(short = 'n', long, default_value_t = 1)]
        samples: usize,
    },

    /// Interleave front/middle/back phrase lists at `|` markers, then expand
    Combine {
        #[arg(short, long, default_value = "")]
        front: String,

        #[arg(short, long, default_value = "")]
        middle: String,

        #[arg(short, long, default_value = "")]
        back: String,

        /// Number of samples to lower
        #[arg(short = 'n', long, default_value_t = 1)]
        samples: usize,
    },

    /// Check that brackets in a prompt are balanced
    Check {
        text: String,
    },

    /// Run a batch file of generation jobs through the task queue
    Run {
        /// Batch YAML file
        batch: PathBuf,

        /// Print the plan and cost warnings without running
        #[arg(long)]
        dry_run: bool,
    },

    /// List loaded piece libraries
    Libraries {
        /// Also list the pieces of each library
        #[arg(short, long)]
        pieces: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["promptloom"]).is_err());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["promptloom", "-v", "libraries"]).unwrap();
        assert!(cli.is_verbose());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["promptloom", "check", "a", "-c", "/path/to/config.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/config.yml")));
    }

    #[test]
    fn test_expand_command() {
        let cli = Cli::try_parse_from(["promptloom", "expand", "1girl, <char.alice>", "-n", "3"]).unwrap();
        match cli.command {
            Commands::Expand { prompt, samples } => {
                assert_eq!(prompt, "1girl, <char.alice>");
                assert_eq!(samples, 3);
            }
            _ => panic!("Expected expand command"),
        }
    }

    #[test]
    fn test_expand_default_samples() {
        let cli = Cli::try_parse_from(["promptloom", "expand", "1girl"]).unwrap();
        match cli.command {
            Commands::Expand { samples, .. } => assert_eq!(samples, 1),
            _ => panic!("Expected expand command"),
        }
    }

    #[test]
    fn test_combine_command() {
        let cli = Cli::try_parse_from([
            "promptloom",
            "combine",
            "--front",
            "a, |, b",
            "--middle",
            "m",
        ])
        .unwrap();
        match cli.command {
            Commands::Combine {
                front,
                middle,
                back,
                samples,
            } => {
                assert_eq!(front, "a, |, b");
                assert_eq!(middle, "m");
                assert_eq!(back, "");
                assert_eq!(samples, 1);
            }
            _ => panic!("Expected combine command"),
        }
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from(["promptloom", "run", "batch.yml", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Run { batch, dry_run } => {
                assert_eq!(batch, PathBuf::from("batch.yml"));
                assert!(dry_run);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_libraries_command() {
        let cli = Cli::try_parse_from(["promptloom", "libraries", "--pieces"]).unwrap();
        assert!(matches!(cli.command, Commands::Libraries { pieces: true }));
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
