use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "omni-convert")]
#[command(about = "STL -> STEP conversion jobs with TTL-bound records and scheduled cleanup.")]
pub(crate) struct Cli {
    /// Override config directory (reads `<dir>/omni-convert/settings.yaml`).
    #[arg(long, global = true)]
    pub(crate) conf: Option<PathBuf>,

    /// Debug logging for omni_convert (ignored when RUST_LOG is set).
    #[arg(long, short, global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the scheduled cleanup sweeper until Ctrl+C / SIGTERM.
    Serve,
    /// Stage a local STL file, convert it, and print the job status as JSON.
    Convert {
        /// STL mesh to convert.
        file: PathBuf,
    },
    /// Print the status report of a job as JSON.
    Status {
        job_id: String,
    },
    /// Copy the STEP artifact of a completed job to a local path.
    Fetch {
        job_id: String,

        /// Destination file (default: the job's output file name in the cwd).
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Run one cleanup sweep now and print its summary as JSON.
    Sweep,
}
