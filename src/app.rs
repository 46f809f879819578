use std::io::{BufRead, IsTerminal, Write};

use chrono::Utc;
use thiserror::Error;

use crashreport::{
    CrashLogStore, CrashRecorder, Fault, Metadata, ParsedRecord, StaticMetadata, UploadManager,
    UreqTransport, run_pass,
};

use crate::cli::{Cli, Commands};
use crate::output::{
    PendingRow, output_pending_json, print_pending_table, print_reconcile_report,
};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    Crash(#[from] crashreport::Error),

    #[error("No crash record named {0}")]
    UnknownRecord(String),

    #[error("No collector identifier configured (pass --identifier or set it in config.toml)")]
    MissingIdentifier,
}

/// Consent prompt answered on the terminal
struct StdinPrompt;

impl crashreport::ConsentPrompt for StdinPrompt {
    fn ask_yes_no(&self, title: &str, message: &str) -> bool {
        eprint!("{title}: {message} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

pub(crate) fn run(cli: Cli) -> Result<(), AppError> {
    let store = CrashLogStore::open(cli.storage_dir())?;
    tracing::debug!(dir = %store.dir().display(), "using crash log folder");

    match &cli.command {
        None | Some(Commands::List) => handle_list(&cli, &store),
        Some(Commands::Show { file }) => handle_show(&store, file),
        Some(Commands::Send { yes, user_id }) => {
            handle_send(&cli, &store, *yes, user_id.as_deref())
        }
        Some(Commands::Record { message, kind }) => handle_record(&cli, store, message, kind),
        Some(Commands::Purge) => {
            let removed = store.purge()?;
            println!("Deleted {removed} pending crash report(s).");
            Ok(())
        }
    }
}

fn handle_list(cli: &Cli, store: &CrashLogStore) -> Result<(), AppError> {
    let now = Utc::now();
    let keep_age = chrono::TimeDelta::from_std(cli.keep_age()).unwrap_or(chrono::TimeDelta::MAX);

    let mut rows = Vec::new();
    for file in store.enumerate()? {
        // A record may disappear or be unreadable; list what can be read
        let parsed = match store.read_text(&file) {
            Ok(text) => ParsedRecord::parse(&text),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable crash log");
                continue;
            }
        };
        let age = file.age(now);
        rows.push(PendingRow {
            file: file.file_name().to_string(),
            captured_at: file.captured_at(),
            age_seconds: age.num_seconds(),
            expired: age > keep_age,
            package: parsed.package_name.clone(),
            headline: parsed.headline().to_string(),
        });
    }

    if cli.json {
        println!("{}", output_pending_json(&rows));
    } else {
        print_pending_table(&rows, std::io::stdout().is_terminal());
    }
    Ok(())
}

fn handle_show(store: &CrashLogStore, name: &str) -> Result<(), AppError> {
    let file = store
        .find(name)
        .ok_or_else(|| AppError::UnknownRecord(name.to_string()))?;
    println!("{}", store.read_text(&file)?);
    Ok(())
}

fn handle_send(
    cli: &Cli,
    store: &CrashLogStore,
    yes: bool,
    user_id: Option<&str>,
) -> Result<(), AppError> {
    let identifier = cli.identifier.as_deref().ok_or(AppError::MissingIdentifier)?;
    let manager = UploadManager::new(Box::new(UreqTransport::new()), identifier)
        .with_collector_url(cli.collector_url())
        .with_keep_age(cli.keep_age());

    let ask = !yes && cli.ask_before_sending.unwrap_or(true);
    let user_id = user_id.or(cli.user_id.as_deref());
    let report = run_pass(store, &manager, &StdinPrompt, ask, user_id, Utc::now());
    print_reconcile_report(&report, cli.json);
    Ok(())
}

fn handle_record(
    cli: &Cli,
    store: CrashLogStore,
    message: &str,
    kind: &str,
) -> Result<(), AppError> {
    let metadata = Metadata::collect(&StaticMetadata::new(cli.package_name(), ""));
    let recorder = CrashRecorder::new(store, metadata);
    let file = recorder.try_capture_at(message, &Fault::new(kind, message), None, Utc::now())?;
    if cli.json {
        println!("{}", serde_json::json!({ "file": file.file_name() }));
    } else {
        println!("Wrote {}", file.path().display());
    }
    Ok(())
}
