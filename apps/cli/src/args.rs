use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use usage_app::RangeParams;

#[derive(Debug, Parser)]
#[command(name = "command-center")]
#[command(about = "Usage statistics from local assistant logs")]
pub struct Cli {
    /// Reprocess every log file, even unchanged ones
    #[arg(long, global = true)]
    pub force_rescan: bool,

    /// Drop all stored data and ingest from scratch
    #[arg(long, global = true)]
    pub rebuild: bool,

    /// Log run summaries and skipped files to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Pretty-print JSON output
    #[arg(long, short, global = true)]
    pub pretty: bool,

    /// Path to the TOML config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan log roots and print ingest statistics (default)
    Ingest,

    /// Token, cost and session totals
    Totals(RangeArgs),

    /// Everything the overview screen shows
    Dashboard(RangeArgs),

    /// Daily activity grouped by day, week or month
    Timeline {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, default_value = "day")]
        granularity: String,
    },

    /// Hourly breakdown, models and sessions for one local date
    Day {
        /// Local date, YYYY-MM-DD
        date: String,
        #[arg(long)]
        project: Option<String>,
    },

    /// Daily activity and top sessions for one model
    Model {
        model: String,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Totals and messages for one session
    Session { session_id: String },

    /// Top models for a year
    TopModels {
        year: i32,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Rate-limit events in range plus the latest one
    Limits(RangeArgs),

    /// Project metadata
    #[command(subcommand)]
    Projects(ProjectsCommand),

    /// Store a scraper snapshot read from a file or stdin
    Snapshot {
        file: Option<PathBuf>,
    },

    /// Latest snapshot per account
    Accounts,

    /// Verify database integrity
    Check,
}

#[derive(Debug, Subcommand)]
pub enum ProjectsCommand {
    List,
    Update {
        project_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        visible: Option<bool>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct RangeArgs {
    /// today, yesterday, last7days, last30days, thismonth, thisyear, alltime
    #[arg(long)]
    pub range: Option<String>,
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
}

impl From<RangeArgs> for RangeParams {
    fn from(args: RangeArgs) -> Self {
        RangeParams {
            range: args.range,
            from: args.from,
            to: args.to,
            project: args.project,
        }
    }
}
