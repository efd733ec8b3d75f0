use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "pluck")]
#[command(about = "Reclaim unused space in Firebird/RedDatabase files by punching holes")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short = 'd', long = "debug-level", action = ArgAction::Count, global = true)]
    pub debug_level: u8,

    /// Control colored output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find free pages and unused blocks, and punch holes through them
    Trim {
        /// Path to the database file
        #[arg(short, long)]
        file: String,

        /// Punch holes (default is a dry run that only counts)
        #[arg(long)]
        trim: bool,

        /// Filesystem block size in bytes (512 or 4096)
        #[arg(short, long, default_value_t = 512)]
        block_size: u32,

        /// Stage: 1 = whole free pages only, 2 = also unused blocks in pages
        #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
        stage: u8,

        /// Number of Stage 2 workers (1-256)
        #[arg(short = 'j', long, default_value_t = 1)]
        workers: u32,

        /// Record worker progress here and resume from it
        #[arg(short, long)]
        checkpoint: Option<String>,

        /// Leave pages found free in Stage 1 out of Stage 2
        #[arg(long = "skip-free")]
        skip_free: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the records of a checkpoint file
    Checkpoint {
        /// Path to the checkpoint file
        #[arg(short, long)]
        checkpoint: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the decoded header of a database file
    Info {
        /// Path to the database file
        #[arg(short, long, required_unless_present = "supported")]
        file: Option<String>,

        /// List the supported ODS versions
        #[arg(long)]
        supported: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
