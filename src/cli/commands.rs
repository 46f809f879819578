//! CLI subcommand definitions

use clap::Subcommand;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List pending crash records (default)
    List,
    /// Print one raw crash record
    Show {
        /// File name as shown by `list`
        file: String,
    },
    /// Run a reconciliation pass: upload, expire or discard pending records
    Send {
        /// Send without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// User identifier attached to each upload
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
    },
    /// Write a crash record through the normal capture path
    Record {
        /// Message stored at the end of the record
        message: String,
        /// Fault type name
        #[arg(long, default_value = "manual")]
        kind: String,
    },
    /// Delete all pending crash records without sending them
    Purge,
}
