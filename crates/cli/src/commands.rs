use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Connection and storage options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Postgres connection string of the source (and archive) database
    #[arg(long, global = true, env = "MIGRATE_SOURCE_URL")]
    pub source_url: Option<String>,

    /// MongoDB connection string of the target
    #[arg(long, global = true, env = "MIGRATE_TARGET_URI")]
    pub target_uri: Option<String>,

    /// Target database used when a job does not name one
    #[arg(long, global = true, env = "MIGRATE_TARGET_DATABASE")]
    pub target_database: Option<String>,

    /// Directory of JSON job definitions
    #[arg(long, global = true, env = "MIGRATE_CATALOG_DIR")]
    pub catalog: Option<PathBuf>,

    /// Directory of the run history store
    #[arg(long, global = true, env = "MIGRATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// JSON file with monitor thresholds
    #[arg(long, global = true, env = "MIGRATE_MONITOR_CONFIG")]
    pub monitor_config: Option<PathBuf>,

    /// Extra KEY=VALUE variables consulted for unset options
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a job and wait for it to finish
    Run {
        #[arg(long, help = "Job name in the catalog")]
        job: String,

        #[arg(long = "param", value_name = "KEY=VALUE", help = "Run parameter, repeatable")]
        params: Vec<String>,
    },
    /// Rerun a failed or stopped run with its original parameters
    Restart {
        #[arg(long, help = "Job name in the catalog")]
        job: String,

        #[arg(long, help = "Run ID to restart")]
        run: String,
    },
    /// List the jobs in the catalog
    Jobs,
    History {
        #[arg(long, help = "Job name to inspect")]
        job: String,

        #[arg(long, default_value_t = 20, help = "Number of runs to show")]
        limit: usize,

        #[arg(
            long,
            help = "If set, prints the history as JSON instead of a table"
        )]
        json: bool,
    },
    /// Probe both stores and report overall health
    Health {
        #[arg(
            long,
            help = "If set, prints the health report as JSON instead of a table"
        )]
        json: bool,
    },
    /// Test a connection string against a given format
    TestConn {
        /// Data format: "pg" or "mongo"
        #[arg(long)]
        format: String,

        /// Connection string or address
        #[arg(long)]
        conn_str: String,
    },
}
