use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "qanun",
    version,
    about = "Persian legal statute extraction and chunking tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Process(ProcessArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Text export of the source document, one paragraph per line.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "data/processed")]
    pub output_dir: PathBuf,

    /// Optional JSON file overriding the processing configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "data/processed")]
    pub output_dir: PathBuf,
}
