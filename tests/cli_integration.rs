use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "crashreport-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write test file");
}

/// Run the binary against an isolated config file so the user's own
/// settings never leak into the test.
fn run_crashreport(root: &Path, args: &[&str]) -> (bool, Vec<u8>, Vec<u8>) {
    let bin = std::env::var("CARGO_BIN_EXE_crashreport").unwrap_or_else(|_| {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("target");
        path.push("debug");
        if cfg!(windows) {
            path.push("crashreport.exe");
        } else {
            path.push("crashreport");
        }
        path.to_string_lossy().into_owned()
    });
    let config = root.join("config.toml");
    if !config.exists() {
        write_file(&config, "");
    }
    let output = Command::new(bin)
        .arg("--config")
        .arg(&config)
        .arg("--dir")
        .arg(root.join("crashes"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run crashreport");
    (output.status.success(), output.stdout, output.stderr)
}

fn pending_files(root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(root.join("crashes")) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("crash") && n.ends_with(".log"))
        .collect();
    names.sort();
    names
}

#[test]
fn record_then_list_json() {
    let root = unique_temp_dir("record-list");

    let (ok, stdout, stderr) = run_crashreport(
        &root,
        &["record", "cache rebuild failed", "--kind", "io", "-j"],
    );
    assert!(ok, "stderr: {}", String::from_utf8_lossy(&stderr));
    let written: Value = serde_json::from_slice(&stdout).expect("json");
    let name = written["file"].as_str().expect("file name").to_string();
    assert_eq!(pending_files(&root), vec![name.clone()]);

    let (ok, stdout, stderr) = run_crashreport(&root, &["list", "-j", "-p", "com.example.cli"]);
    assert!(ok, "stderr: {}", String::from_utf8_lossy(&stderr));
    let json: Value = serde_json::from_slice(&stdout).expect("json");
    let rows = json.as_array().expect("array output");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["file"].as_str(), Some(name.as_str()));
    assert_eq!(rows[0]["headline"].as_str(), Some("io: cache rebuild failed"));
    assert_eq!(rows[0]["expired"].as_bool(), Some(false));

    fs::remove_dir_all(root).ok();
}

#[test]
fn show_prints_raw_record() {
    let root = unique_temp_dir("show");
    let text = "Package: com.example.app\nVersion: 1.2.0.0\nPlatform: linux x86_64\n\
                Manufacturer: Unknown\nModel: Unknown\nDate: 2026-03-01T10:00:00Z\n\n\
                panic: boom\n\nUnhandled panic on thread 'main'";
    write_file(&root.join("crashes").join("crash2026-03-01T10-00-00Z.log"), text);

    let (ok, stdout, stderr) =
        run_crashreport(&root, &["show", "crash2026-03-01T10-00-00Z.log"]);
    assert!(ok, "stderr: {}", String::from_utf8_lossy(&stderr));
    assert_eq!(String::from_utf8_lossy(&stdout).trim_end(), text);

    let (ok, _, stderr) = run_crashreport(&root, &["show", "crash2020-01-01T00-00-00Z.log"]);
    assert!(!ok);
    assert!(String::from_utf8_lossy(&stderr).contains("No crash record named"));

    fs::remove_dir_all(root).ok();
}

#[test]
fn send_discards_expired_record_without_network() {
    let root = unique_temp_dir("send-expired");
    write_file(
        &root.join("crashes").join("crash2020-01-01T00-00-00Z.log"),
        "Package: old\n\npanic: stale\n\nold crash",
    );
    // Nothing listens on the discard port; an upload attempt would be deferred
    write_file(
        &root.join("config.toml"),
        "identifier = \"app-id\"\ncollector_url = \"http://127.0.0.1:9\"\n",
    );

    let (ok, stdout, stderr) = run_crashreport(&root, &["send", "--yes", "-j"]);
    assert!(ok, "stderr: {}", String::from_utf8_lossy(&stderr));
    let json: Value = serde_json::from_slice(&stdout).expect("json");
    assert_eq!(json["counts"]["expired"].as_u64(), Some(1));
    assert_eq!(json["counts"]["sent"].as_u64(), Some(0));
    assert_eq!(json["files"][0]["result"].as_str(), Some("expired"));
    assert!(pending_files(&root).is_empty());

    fs::remove_dir_all(root).ok();
}

#[test]
fn send_without_identifier_fails() {
    let root = unique_temp_dir("send-no-id");
    write_file(
        &root.join("crashes").join("crash2026-03-01T10-00-00Z.log"),
        "Package: app\n\npanic: boom\n\nmsg",
    );

    let (ok, _, stderr) = run_crashreport(&root, &["send", "--yes"]);
    assert!(!ok);
    assert!(String::from_utf8_lossy(&stderr).contains("No collector identifier"));
    assert_eq!(pending_files(&root).len(), 1);

    fs::remove_dir_all(root).ok();
}

#[test]
fn purge_removes_everything() {
    let root = unique_temp_dir("purge");
    for name in ["crash2026-03-01T10-00-00Z.log", "crash2026-03-02T10-00-00Z.log"] {
        write_file(&root.join("crashes").join(name), "Package: app\n\npanic: x\n\nmsg");
    }
    write_file(&root.join("crashes").join("notes.txt"), "keep me");

    let (ok, stdout, stderr) = run_crashreport(&root, &["purge"]);
    assert!(ok, "stderr: {}", String::from_utf8_lossy(&stderr));
    assert!(String::from_utf8_lossy(&stdout).contains("Deleted 2"));
    assert!(pending_files(&root).is_empty());
    assert!(root.join("crashes").join("notes.txt").exists());

    fs::remove_dir_all(root).ok();
}

#[test]
fn invalid_config_exits_with_error() {
    let root = unique_temp_dir("bad-config");
    write_file(&root.join("config.toml"), "no_such_key = 1\n");

    let (ok, _, stderr) = run_crashreport(&root, &["list"]);
    assert!(!ok);
    assert!(!stderr.is_empty());

    fs::remove_dir_all(root).ok();
}
