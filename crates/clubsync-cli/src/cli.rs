use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clubsync_core::Strategy;

#[derive(Parser)]
#[command(name = "clubsync")]
#[command(about = "Keep the club database and clubs.json in step")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Git working tree holding the snapshot (overrides CLUBSYNC_REPO_ROOT)
    #[arg(long, global = true, value_name = "PATH")]
    pub repo_root: Option<PathBuf>,

    /// Snapshot file, relative to the repo root unless absolute
    #[arg(long, global = true, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Local club database file (overrides CLUBSYNC_DB_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare the database with the snapshot
    #[command(alias = "compare")]
    Diff {
        /// Also list records that are identical on both sides
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a sync job: pull, reconcile, commit, push
    Sync {
        #[arg(short, long, value_enum, default_value_t = StrategyArg::Merge)]
        strategy: StrategyArg,
        /// Commit message (defaults to CLUBSYNC_COMMIT_MESSAGE)
        #[arg(short, long)]
        message: Option<String>,
        /// Reconcile the two stores only, without touching git
        #[arg(long)]
        local: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render the database in the snapshot format
    Export {
        /// Only clubs in this province
        #[arg(long)]
        province: Option<String>,
        /// Only clubs of this school
        #[arg(long)]
        school: Option<String>,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Check every snapshot entry without changing anything
    Validate {
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
pub enum StrategyArg {
    /// Merge both ways, the snapshot wins on conflicting fields
    Merge,
    /// Overwrite the snapshot with the database
    StoreToFile,
    /// Replace the database with the snapshot
    FileToStore,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Merge => Self::Merge,
            StrategyArg::StoreToFile => Self::StoreToFile,
            StrategyArg::FileToStore => Self::FileToStore,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
