//! Purpose: Render CLI output: JSON documents on stdout and diagnostics on stderr.
//! Exports: `ColorMode`, `emit_json`, `emit_error`, and the `*_json` renderers.
//! Role: Pure formatting for `main.rs`/`command_dispatch.rs`; no network access.
//! Invariants: stdout carries exactly one JSON document per command.
//! Invariants: Non-TTY stderr errors are single-line JSON: `{"error":{...}}`.
//! Invariants: ANSI escapes appear only on a TTY or with `--color always`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};

use clap::ValueEnum;
use geovector::api::{
    Error, ErrorKind, Feature, FeatureCollection, JobStatus, UploadTask,
};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub(crate) enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub(crate) fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

pub(crate) fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

pub(crate) fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::InvalidQuery => "invalid query",
        ErrorKind::BadRequest => "bad request",
        ErrorKind::Unauthorized => "not authorized",
        ErrorKind::NotFound => "not found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::RateLimit => "rate limit exceeded",
        ErrorKind::GatewayTimeout => "gateway timeout",
        ErrorKind::Server => "server error",
        ErrorKind::Io => "i/o error",
        ErrorKind::FailedJob => "job failed",
        ErrorKind::WaitTimeout => "timed out waiting",
        ErrorKind::NotReady => "not ready",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(product) = err.product() {
        inner.insert("product".to_string(), json!(product));
    }
    if let Some(job) = err.job() {
        inner.insert("job".to_string(), json!(job));
    }
    if !err.details().is_empty() {
        inner.insert("details".to_string(), json!(err.details()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let label = |text: &str| colorize_label(text, use_color, AnsiColor::Yellow);
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", label("hint:")));
    }
    if let Some(status) = err.status() {
        lines.push(format!("{} {status}", label("status:")));
    }
    if let Some(product) = err.product() {
        lines.push(format!("{} {product}", label("product:")));
    }
    if let Some(job) = err.job() {
        lines.push(format!("{} {job}", label("job:")));
    }
    for detail in err.details() {
        lines.push(format!("{} {detail}", label("detail:")));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("{} {cause}", label("caused by:")));
    }
    lines.join("\n")
}

fn timestamp_json(ts: Option<OffsetDateTime>) -> Value {
    ts.and_then(|ts| ts.format(&Rfc3339).ok())
        .map(Value::String)
        .unwrap_or(Value::Null)
}

pub(crate) fn product_json(collection: &FeatureCollection) -> Value {
    json!({
        "id": collection.id(),
        "name": collection.name(),
        "title": collection.title(),
        "description": collection.description(),
        "owners": collection.owners(),
        "readers": collection.readers(),
        "writers": collection.writers(),
    })
}

pub(crate) fn feature_json(feature: &Feature) -> Value {
    feature.geojson()
}

pub(crate) fn job_json(product_id: &str, status: &JobStatus) -> Value {
    json!({
        "product": product_id,
        "job": status.id,
        "state": status.state.as_str(),
        "created": timestamp_json(status.created),
        "started": timestamp_json(status.started),
        "ended": timestamp_json(status.ended),
        "errors": status.errors,
    })
}

pub(crate) fn upload_task_json(task: &UploadTask) -> Value {
    let mut value = json!({
        "product": task.product_id(),
        "upload_id": task.upload_id(),
        "status": task.status().as_str(),
        "created": timestamp_json(task.created()),
    });
    if let (Some(result), Value::Object(map)) = (task.result(), &mut value) {
        map.insert(
            "result".to_string(),
            json!({
                "errors": result.errors,
                "error_rows": result.error_rows,
                "input_features": result.input_features,
                "input_rows": result.input_rows,
                "job_id": result.job_id,
            }),
        );
    }
    value
}
