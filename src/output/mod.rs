mod format;
mod pending;

pub(crate) use pending::{
    PendingRow, output_pending_json, print_pending_table, print_reconcile_report,
};
