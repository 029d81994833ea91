use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "crawlbot",
    about = "Autopilot decision loop for a terminal dungeon crawler",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the decision loop against the capture and executor mailboxes
    Run {
        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Override the console dump path
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Override the command queue path
        #[arg(long)]
        queue: Option<PathBuf>,

        /// Do not write the decision journal
        #[arg(long)]
        no_journal: bool,
    },

    /// Print the perception snapshot for a saved screen dump
    Extract {
        /// Dump file to read
        file: PathBuf,

        /// Row width for dumps without line breaks
        #[arg(long)]
        width: Option<usize>,
    },

    /// Show the effective configuration
    Config {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}
