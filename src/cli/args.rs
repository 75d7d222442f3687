use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser)]
#[clap(
    version,
    about = "Study companion: notes with undo, clipboard capture, check-ins and a book library"
)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Path to the data directory
    #[clap(long, value_parser)]
    pub data_dir: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the studydesk application
    #[clap(subcommand)]
    pub command: Commands,
}
