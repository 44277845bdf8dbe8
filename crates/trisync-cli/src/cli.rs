use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "trisync")]
#[command(about = "Keep MYSQL, POSTGRES and SQLSERVER replicas converged")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the peer databases and sync state
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the synchronization service until interrupted
    Run,
    /// Execute a single sync pass
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-source checkpoints and the open conflict count
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recorded conflicts
    Conflicts {
        /// Filter by lifecycle state
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect a conflict through its signed view link
    View {
        /// Token from a notification link
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict by declaring one peer authoritative
    Resolve {
        /// Conflict id (see `trisync conflicts`)
        conflict_id: i64,
        /// Peer whose row wins
        #[arg(value_enum)]
        peer: PeerChoice,
        /// Operator recorded on the resolution
        #[arg(long, default_value = "admin")]
        admin: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PeerChoice {
    Mysql,
    Postgres,
    Sqlserver,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusFilter {
    Open,
    Resolved,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
