use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color};
use serde::Serialize;

use crashreport::ReconcileReport;

use super::format::{create_styled_table, format_age, header_cell, right_cell};

/// One pending crash record as listed by `crashreport list`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PendingRow {
    pub(crate) file: String,
    pub(crate) captured_at: DateTime<Utc>,
    pub(crate) age_seconds: i64,
    pub(crate) expired: bool,
    pub(crate) package: String,
    pub(crate) headline: String,
}

pub(crate) fn print_pending_table(rows: &[PendingRow], use_color: bool) {
    if rows.is_empty() {
        println!("No pending crash reports.");
        return;
    }

    let mut table = create_styled_table();
    table.set_header(vec![
        header_cell("File", use_color),
        header_cell("Captured (UTC)", use_color),
        header_cell("Age", use_color),
        header_cell("Package", use_color),
        header_cell("Fault", use_color),
    ]);

    for row in rows {
        let age_color = (use_color && row.expired).then_some(Color::DarkGrey);
        table.add_row(vec![
            Cell::new(&row.file),
            Cell::new(row.captured_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            right_cell(
                &format_age(chrono::TimeDelta::seconds(row.age_seconds)),
                age_color,
            ),
            Cell::new(&row.package),
            Cell::new(&row.headline),
        ]);
    }

    println!("{table}");
    println!("\n  {} pending crash report(s)\n", rows.len());
}

pub(crate) fn output_pending_json(rows: &[PendingRow]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn print_reconcile_report(report: &ReconcileReport, json: bool) {
    let counts = report.counts();
    if json {
        let files: Vec<serde_json::Value> = report
            .outcomes
            .iter()
            .map(|(file, disposition)| {
                serde_json::json!({
                    "file": file.file_name(),
                    "result": disposition.label(),
                })
            })
            .collect();
        let value = serde_json::json!({ "counts": counts, "files": files });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_default()
        );
        return;
    }

    if report.is_empty() {
        println!("No pending crash reports.");
        return;
    }
    for (file, disposition) in &report.outcomes {
        println!("  {:<10} {}", disposition.label(), file.file_name());
    }
    println!(
        "\n  sent {}, expired {}, deferred {}, declined {}, failed {}\n",
        counts.sent, counts.expired, counts.deferred, counts.declined, counts.failed
    );
}
