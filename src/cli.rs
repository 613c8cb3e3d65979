use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{backend::BackendKind, chunker::Granularity};

#[derive(Debug, Parser)]
#[command(
    name = "kvindex",
    about = "Build, query and serve key-value retrieval indices"
)]
pub struct Cli {
    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build an index from a corpus directory and persist it
    Build(BuildArgs),
    /// Query a persisted index
    Query(QueryArgs),
    /// Serve a persisted index over HTTP
    Serve(ServeArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Build --

#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Directory of JSON corpus files
    pub corpus_dir: PathBuf,

    /// Name of the index (also the snapshot file stem)
    #[arg(long)]
    pub name: String,

    /// Retrieval backend: bm25, instructor, e5 or gtr
    #[arg(short = 'b', long, default_value = "bm25")]
    pub backend: BackendKind,

    /// Chunk granularity: paragraphs or propositions
    #[arg(short = 'g', long, default_value = "paragraphs")]
    pub granularity: Granularity,

    /// Directory to write the snapshot into
    #[arg(short = 'o', long, default_value = "retrieval_indices")]
    pub out_dir: PathBuf,

    /// Drop chunks shorter than this many words
    #[arg(long, default_value = "10")]
    pub min_words: usize,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Path to a persisted index snapshot
    pub index_path: PathBuf,

    /// Query text; omit to enter an interactive prompt
    pub query: Option<String>,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub top_k: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Path to a persisted index snapshot
    pub index_path: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "kvindex",
            &mut std::io::stdout(),
        );
    }
}
