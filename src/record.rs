//! Crash record codec
//!
//! Renders a captured [`Fault`] plus the session [`Metadata`] into the plain
//! text stored on disk and uploaded as `raw`. Rendering is pure and never
//! fails: blank metadata becomes `Unknown`.
//!
//! ```text
//! Package: com.example.notes
//! Version: 1.2.3.0
//! Platform: linux x86_64
//! Manufacturer: Unknown
//! Model: Unknown
//! Date: 2026-03-01T12:30:05Z
//!
//! panic: index out of bounds
//!    at src/editor.rs:41:9
//!  ---> caused by ...
//! <backtrace>
//!
//! <extra stack trace>
//!
//! <message>
//! ```

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::panic::PanicHookInfo;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::consts::{DATE_HEADER_FORMAT, UNKNOWN};
use crate::metadata::{AppVersion, Metadata};

/// Backtraces longer than this are cut (64 KiB)
const MAX_BACKTRACE_LEN: usize = 64 * 1024;

/// A captured fault: type name, message, cause chain and optional stack trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fault {
    pub kind: String,
    pub message: String,
    pub location: Option<String>,
    pub causes: Vec<String>,
    pub backtrace: Option<String>,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Capture an error value together with its `source()` chain.
    pub fn from_error<E: StdError + ?Sized>(err: &E) -> Self {
        let kind = std::any::type_name::<E>();
        // Trait objects carry no useful concrete name
        let kind = if kind.starts_with("dyn ") { "error" } else { kind };

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: kind.to_string(),
            message: err.to_string(),
            location: None,
            causes,
            backtrace: None,
        }
    }

    /// Build a fault from inside a panic hook.
    pub fn from_panic(info: &PanicHookInfo<'_>, backtrace: Option<&Backtrace>) -> Self {
        Self {
            kind: "panic".to_string(),
            message: panic_payload_message(info.payload()),
            location: info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column())),
            causes: Vec::new(),
            backtrace: backtrace.map(|bt| bt.to_string()),
        }
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }

    /// Type name, message, location, cause chain and stack trace as text.
    ///
    /// The description never contains a blank line, so it stays a single
    /// block inside a rendered record.
    pub fn describe(&self) -> String {
        let kind = non_blank(&self.kind);
        let message = without_blank_lines(&self.message);
        let mut out = if message.is_empty() {
            kind.to_string()
        } else {
            format!("{kind}: {message}")
        };
        if let Some(loc) = &self.location {
            let _ = write!(out, "\n   at {loc}");
        }
        for cause in &self.causes {
            let _ = write!(out, "\n ---> {}", without_blank_lines(cause));
        }
        if let Some(bt) = &self.backtrace {
            let bt = truncate_backtrace(bt);
            push_without_blank_lines(&mut out, &bt);
        }
        out
    }
}

/// Panic payloads are `&str` or `String` in practice
pub(crate) fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Render one crash record. Output is trimmed UTF-8 with fields in fixed order.
pub fn render(
    message: &str,
    fault: &Fault,
    extra_stack_trace: Option<&str>,
    metadata: &Metadata,
    captured_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Package: {}", non_blank(&metadata.package_name));
    let _ = writeln!(out, "Version: {}", metadata.version_label());
    let _ = writeln!(out, "Platform: {}", non_blank(&metadata.platform_label));
    let _ = writeln!(
        out,
        "Manufacturer: {}",
        non_blank(&metadata.device_manufacturer)
    );
    let _ = writeln!(out, "Model: {}", non_blank(&metadata.device_model));
    let _ = writeln!(out, "Date: {}", captured_at.format(DATE_HEADER_FORMAT));
    out.push('\n');
    out.push_str(&fault.describe());

    if let Some(extra) = extra_stack_trace.map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str("\n\n");
        let mut block = String::new();
        push_without_blank_lines(&mut block, extra);
        out.push_str(block.trim_start_matches('\n'));
    }

    out.push_str("\n\n");
    out.push_str(message.trim());
    out.trim().to_string()
}

fn non_blank(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() { UNKNOWN } else { value }
}

fn truncate_backtrace(bt: &str) -> String {
    if bt.len() <= MAX_BACKTRACE_LEN {
        return bt.to_string();
    }
    let mut end = MAX_BACKTRACE_LEN;
    while !bt.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = bt[..end].to_string();
    truncated.push_str("\n... [truncated]");
    truncated
}

fn without_blank_lines(text: &str) -> String {
    let mut out = String::new();
    push_without_blank_lines(&mut out, text.trim());
    out.trim_start_matches('\n').to_string()
}

fn push_without_blank_lines(out: &mut String, text: &str) {
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        out.push('\n');
        out.push_str(line.trim_end());
    }
}

/// Header fields and blocks read back from a rendered record.
///
/// The message is the block after the last blank line, so a message that
/// itself contains a blank line is only partially recovered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    pub package_name: String,
    pub version: Option<AppVersion>,
    pub platform_label: String,
    pub device_manufacturer: String,
    pub device_model: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub exception: String,
    pub extra_stack_trace: Option<String>,
    pub message: String,
}

impl ParsedRecord {
    pub fn parse(text: &str) -> Self {
        let text = text.replace("\r\n", "\n");
        let (header, body) = text.split_once("\n\n").unwrap_or((text.as_str(), ""));

        let mut parsed = Self::default();
        for line in header.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "Package" => parsed.package_name = value.to_string(),
                "Version" => parsed.version = AppVersion::parse(value),
                "Platform" => parsed.platform_label = value.to_string(),
                "Manufacturer" => parsed.device_manufacturer = value.to_string(),
                "Model" => parsed.device_model = value.to_string(),
                "Date" => {
                    parsed.captured_at = NaiveDateTime::parse_from_str(value, DATE_HEADER_FORMAT)
                        .ok()
                        .map(|dt| dt.and_utc());
                }
                _ => {}
            }
        }

        let blocks: Vec<&str> = body.split("\n\n").collect();
        match blocks.as_slice() {
            [] => {}
            [exception] => parsed.exception = exception.trim().to_string(),
            [exception, extra @ .., message] => {
                parsed.exception = exception.trim().to_string();
                parsed.message = message.trim().to_string();
                if !extra.is_empty() {
                    parsed.extra_stack_trace = Some(extra.join("\n\n").trim().to_string());
                }
            }
        }
        parsed
    }

    /// First line of the exception block, e.g. `panic: index out of bounds`
    pub fn headline(&self) -> &str {
        self.exception.lines().next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> Metadata {
        Metadata {
            package_name: "com.example.notes".to_string(),
            app_version: Some(AppVersion::new(1, 2, 3, 0)),
            platform_label: "linux x86_64".to_string(),
            device_manufacturer: "Acme".to_string(),
            device_model: "X1".to_string(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap()
    }

    #[derive(Debug, thiserror::Error)]
    #[error("config unreadable")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn render_fixed_field_order() {
        let fault = Fault::new("panic", "boom");
        let text = render("it broke", &fault, None, &metadata(), at());
        assert_eq!(
            text,
            "Package: com.example.notes\n\
             Version: 1.2.3.0\n\
             Platform: linux x86_64\n\
             Manufacturer: Acme\n\
             Model: X1\n\
             Date: 2026-03-01T12:30:05Z\n\
             \n\
             panic: boom\n\
             \n\
             it broke"
        );
    }

    #[test]
    fn render_substitutes_unknown_for_blank_metadata() {
        let meta = Metadata {
            package_name: "  ".to_string(),
            ..Metadata::default()
        };
        let text = render("m", &Fault::new("panic", "x"), None, &meta, at());
        assert!(text.contains("Package: Unknown\n"));
        assert!(text.contains("Version: Unknown\n"));
        assert!(text.contains("Platform: Unknown\n"));
        assert!(text.contains("Manufacturer: Unknown\n"));
        assert!(text.contains("Model: Unknown\n"));
    }

    #[test]
    fn render_is_trimmed() {
        let text = render("  \n", &Fault::new("panic", "x"), None, &metadata(), at());
        assert_eq!(text, text.trim());
        assert!(text.ends_with("panic: x"));
    }

    #[test]
    fn from_error_walks_cause_chain() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::NotFound, "settings.toml missing"),
        };
        let fault = Fault::from_error(&err);
        assert!(fault.kind.ends_with("Outer"));
        assert_eq!(fault.message, "config unreadable");
        assert_eq!(fault.causes, vec!["settings.toml missing".to_string()]);
        let described = fault.describe();
        assert!(described.contains(" ---> settings.toml missing"));
    }

    #[test]
    fn from_dyn_error_uses_generic_kind() {
        let err: Box<dyn StdError> = "bad".into();
        let fault = Fault::from_error(err.as_ref());
        assert_eq!(fault.kind, "error");
    }

    #[test]
    fn describe_drops_blank_backtrace_lines() {
        let fault = Fault::new("panic", "x").with_backtrace("  0: main\n\n  1: start\n");
        assert_eq!(fault.describe(), "panic: x\n  0: main\n  1: start");
    }

    #[test]
    fn multi_paragraph_message_stays_one_block() {
        let fault = Fault::new("panic", "line one\n\nline two");
        assert_eq!(fault.describe(), "panic: line one\nline two");

        let text = render("msg", &fault, None, &metadata(), at());
        let parsed = ParsedRecord::parse(&text);
        assert_eq!(parsed.exception, fault.describe());
        assert_eq!(parsed.extra_stack_trace, None);
        assert_eq!(parsed.message, "msg");
    }

    #[test]
    fn blank_lines_in_causes_are_dropped() {
        let mut fault = Fault::new("io", "write failed");
        fault.causes = vec!["disk full\n\n  retry later".to_string()];
        assert_eq!(fault.describe(), "io: write failed\n ---> disk full\n  retry later");
    }

    #[test]
    fn oversized_backtrace_is_truncated() {
        let fault = Fault::new("panic", "x").with_backtrace("f\n".repeat(MAX_BACKTRACE_LEN));
        assert!(fault.describe().ends_with("... [truncated]"));
    }

    #[test]
    fn parse_round_trips_fixed_fields() {
        let fault = Fault::new("std::io::Error", "disk full")
            .with_backtrace("  0: app::save\n  1: app::main");
        let text = render("saving failed", &fault, None, &metadata(), at());
        let parsed = ParsedRecord::parse(&text);

        assert_eq!(parsed.package_name, "com.example.notes");
        assert_eq!(parsed.version, Some(AppVersion::new(1, 2, 3, 0)));
        assert_eq!(parsed.platform_label, "linux x86_64");
        assert_eq!(parsed.device_manufacturer, "Acme");
        assert_eq!(parsed.device_model, "X1");
        assert_eq!(parsed.captured_at, Some(at()));
        assert_eq!(parsed.exception, fault.describe());
        assert_eq!(parsed.extra_stack_trace, None);
        assert_eq!(parsed.message, "saving failed");
        assert_eq!(parsed.headline(), "std::io::Error: disk full");
    }

    #[test]
    fn parse_recovers_extra_stack_trace() {
        let fault = Fault::new("panic", "x");
        let text = render(
            "msg",
            &fault,
            Some("worker::run\n\nworker::spawn"),
            &metadata(),
            at(),
        );
        let parsed = ParsedRecord::parse(&text);
        assert_eq!(parsed.exception, "panic: x");
        assert_eq!(
            parsed.extra_stack_trace.as_deref(),
            Some("worker::run\nworker::spawn")
        );
        assert_eq!(parsed.message, "msg");
    }

    #[test]
    fn panic_payload_variants() {
        let s: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_payload_message(s.as_ref()), "static str");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_payload_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_payload_message(s.as_ref()), "unknown panic payload");
    }
}
