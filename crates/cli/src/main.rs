//! chunkstore - capacity-bounded local chunk store

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod util;

/// chunkstore - content-addressed chunks with background garbage collection
#[derive(Parser)]
#[command(name = "chunkstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the store
    #[arg(long, global = true, default_value = ".chunkstore")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split files into chunks and store them
    Put {
        /// Files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Read a chunk by address
    Get {
        /// Chunk address (64 hex characters)
        address: String,
        /// Write the chunk to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the chunk as hex
        #[arg(long)]
        hex: bool,
    },
    /// Store random chunks
    Fill {
        /// Number of chunks to store
        #[arg(long, default_value = "1000")]
        count: usize,
        /// Bytes per chunk (at most 4096)
        #[arg(long, default_value = "4096")]
        size: usize,
    },
    /// Show store statistics
    ///
    /// Opening a store that is over capacity starts a collection pass, so
    /// the counts shown may already reflect it.
    Stats,
    /// Run a collection pass and wait for it
    Gc {
        /// Seconds to wait for the pass to finish
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// Keep the store open with its collector until Ctrl-C
    Run,
    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print an example configuration file
    Example,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = util::StoreArgs {
        config: cli.config,
        data_dir: cli.data_dir,
    };

    match cli.command {
        Commands::Put { files } => cmd::put::run(&store, &files),
        Commands::Get {
            address,
            output,
            hex,
        } => cmd::get::run(&store, &address, output.as_deref(), hex),
        Commands::Fill { count, size } => cmd::fill::run(&store, count, size),
        Commands::Stats => cmd::stats::run(&store),
        Commands::Gc { timeout } => cmd::gc::run(&store, timeout),
        Commands::Run => cmd::run::run(&store).await,
        Commands::Config(ConfigCommands::Example) => cmd::config::run_example(),
        Commands::Config(ConfigCommands::Show) => cmd::config::run_show(&store),
    }
}
