use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line client for the pitch deck analyzer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/pitchdeck/cli.toml).
    #[arg(long, global = true, env = "PITCHDECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print raw JSON instead of a summary.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a deck (PDF or PowerPoint) and start its analysis.
    Analyze {
        file: PathBuf,

        #[arg(short = 'n', long)]
        startup_name: String,

        /// Follow the job's status stream until it finishes.
        #[arg(short, long)]
        watch: bool,
    },

    /// List decks, or show one.
    Decks { id: Option<String> },

    /// Show the status of an analysis job.
    Status { job_id: String },

    /// Show the result of a completed analysis.
    Result { job_id: String },

    /// Follow a job's status stream until it completes or fails.
    Watch { job_id: String },

    /// Manage the knowledge base.
    #[command(subcommand)]
    Knowledge(KnowledgeCommand),
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeCommand {
    /// List knowledge files.
    List,

    /// Upload a supporting document.
    Upload { file: PathBuf },

    /// Search the knowledge base.
    Search { query: String },
}
