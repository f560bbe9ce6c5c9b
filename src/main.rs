//! Purpose: `geovector` CLI entry point: manage vector products from the shell.
//! Role: Binary crate root; parses args, builds the client, emits JSON on stdout.
//! Invariants: Commands emit exactly one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Filters and input files are validated before any request is sent.
#![allow(clippy::result_large_err)]
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod output;

use geovector::api::{
    ClientConfig, Error, ErrorKind, Expression, Feature, FeatureCollection, Geometry,
    ProductSpec, ProductUpdate, VectorClient, VectorService, to_exit_code,
};
use output::{ColorMode, emit_error, emit_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `geovector --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, &cli.remote)
        .map_err(add_auth_hint)
        .map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "geovector",
    version,
    about = "Manage vector products and features on the geovector service",
    long_about = None,
    after_help = r#"EXAMPLES
  $ geovector list
  $ geovector create --name roads --title "Roads" --description "OSM roads"
  $ geovector search <id> --geometry @aoi.geojson --where 'lanes>=2' --limit 10
  $ geovector upload <id> roads.ndjson --wait

ENVIRONMENT
  GEOVECTOR_URL, GEOVECTOR_TOKEN, GEOVECTOR_POLL_INTERVAL_MS, GEOVECTOR_MAX_RETRIES
  RUST_LOG controls diagnostics on stderr (default: warn)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    remote: RemoteArgs,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug, Default)]
struct RemoteArgs {
    #[arg(
        long,
        global = true,
        help = "Service base url (overrides GEOVECTOR_URL)",
        help_heading = "Service"
    )]
    url: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Bearer token (overrides GEOVECTOR_TOKEN)",
        help_heading = "Service"
    )]
    token: Option<String>,
    #[arg(
        long = "tls-ca",
        global = true,
        value_name = "PATH",
        help = "Trust this PEM CA/certificate for TLS",
        value_hint = ValueHint::FilePath,
        help_heading = "Service"
    )]
    tls_ca: Option<PathBuf>,
    #[arg(
        long = "tls-skip-verify",
        global = true,
        conflicts_with = "tls_ca",
        help = "Disable TLS certificate verification (unsafe; dev-only)",
        help_heading = "Service"
    )]
    tls_skip_verify: bool,
}

#[derive(Args, Clone, Debug, Default)]
struct ProductArgs {
    #[arg(long, help = "Short product handle without spaces")]
    name: String,
    #[arg(long, help = "Human-readable title")]
    title: String,
    #[arg(long, help = "Longer description")]
    description: String,
    #[arg(long = "owner", value_name = "PRINCIPAL", help = "Repeatable owner (e.g. user:abc)")]
    owners: Vec<String>,
    #[arg(long = "reader", value_name = "PRINCIPAL", help = "Repeatable reader")]
    readers: Vec<String>,
    #[arg(long = "writer", value_name = "PRINCIPAL", help = "Repeatable writer")]
    writers: Vec<String>,
}

impl ProductArgs {
    fn spec(&self) -> ProductSpec {
        let mut spec = ProductSpec::new(&self.name, &self.title, &self.description);
        spec.owners = non_empty(&self.owners);
        spec.readers = non_empty(&self.readers);
        spec.writers = non_empty(&self.writers);
        spec
    }
}

#[derive(Args, Clone, Debug, Default)]
struct UpdateArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "owner", value_name = "PRINCIPAL", help = "Replaces the owner list")]
    owners: Vec<String>,
    #[arg(long = "reader", value_name = "PRINCIPAL", help = "Replaces the reader list")]
    readers: Vec<String>,
    #[arg(long = "writer", value_name = "PRINCIPAL", help = "Replaces the writer list")]
    writers: Vec<String>,
}

impl UpdateArgs {
    fn update(&self) -> ProductUpdate {
        ProductUpdate {
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            owners: non_empty(&self.owners),
            readers: non_empty(&self.readers),
            writers: non_empty(&self.writers),
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
struct FilterArgs {
    #[arg(
        long,
        value_name = "JSON|@FILE",
        help = "GeoJSON geometry (or Feature) inline, or @path to read it from a file"
    )]
    geometry: Option<String>,
    #[arg(
        long = "where",
        value_name = "CLAUSE",
        help = "Repeatable property clause, e.g. 'lanes>=2' or 'name~Main%' (ANDed)"
    )]
    clauses: Vec<String>,
}

impl FilterArgs {
    fn parse(&self) -> Result<(Option<Geometry>, Option<Expression>), Error> {
        let geometry = self.geometry.as_deref().map(parse_geometry_arg).transpose()?;
        let mut expression: Option<Expression> = None;
        for clause in &self.clauses {
            let parsed = Expression::parse_clause(clause)?;
            expression = Some(match expression {
                Some(existing) => existing.and(parsed),
                None => parsed,
            });
        }
        Ok((geometry, expression))
    }
}

#[derive(Args, Clone, Debug, Default)]
struct WaitArgs {
    #[arg(long, help = "Block until the server-side job finishes")]
    wait: bool,
    #[arg(
        long,
        value_name = "SECS",
        requires = "wait",
        help = "Give up waiting after this many seconds"
    )]
    timeout: Option<u64>,
}

impl WaitArgs {
    fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List the products visible to the caller")]
    List,
    #[command(about = "Show one product")]
    Info {
        #[arg(help = "Product id")]
        id: String,
    },
    #[command(about = "Create a product")]
    Create {
        #[command(flatten)]
        product: ProductArgs,
    },
    #[command(
        about = "Update selected product attributes",
        after_help = "Only the supplied fields are sent; at least one is required."
    )]
    Update {
        #[arg(help = "Product id")]
        id: String,
        #[command(flatten)]
        update: UpdateArgs,
    },
    #[command(about = "Replace every product attribute")]
    Replace {
        #[arg(help = "Product id")]
        id: String,
        #[command(flatten)]
        product: ProductArgs,
    },
    #[command(about = "Delete a product and all of its features")]
    Delete {
        #[arg(help = "Product id")]
        id: String,
    },
    #[command(
        about = "Search features in a product",
        after_help = r#"EXAMPLES
  $ geovector search <id> --geometry '{"type":"Point","coordinates":[-105.9,35.7]}'
  $ geovector search <id> --where 'kind=road' --where 'lanes>1' --limit 100

NOTES
  - At least one of --geometry, --where or --limit is required by the service"#
    )]
    Search {
        #[arg(help = "Product id")]
        id: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, help = "Maximum number of features to return")]
        limit: Option<u64>,
    },
    #[command(about = "Add features from a GeoJSON file (Feature, FeatureCollection or array)")]
    Add {
        #[arg(help = "Product id")]
        id: String,
        #[arg(help = "GeoJSON file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    #[command(about = "Upload newline-delimited GeoJSON for asynchronous ingest")]
    Upload {
        #[arg(help = "Product id")]
        id: String,
        #[arg(help = "Newline-delimited GeoJSON file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(
            long = "max-errors",
            default_value_t = 0,
            help = "Rows allowed to fail before the upload is aborted"
        )]
        max_errors: u64,
        #[command(flatten)]
        wait: WaitArgs,
    },
    #[command(about = "List upload results for a product")]
    Uploads {
        #[arg(help = "Product id")]
        id: String,
    },
    #[command(about = "Copy the features matching a query into a new product")]
    Copy {
        #[arg(help = "Source product id")]
        id: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, help = "Copy at most this many features")]
        limit: Option<u64>,
        #[command(flatten)]
        product: ProductArgs,
        #[command(flatten)]
        wait: WaitArgs,
    },
    #[command(about = "Wait for a product's copy job to finish")]
    WaitCopy {
        #[arg(help = "Target product id of the copy")]
        id: String,
        #[arg(long, value_name = "SECS", help = "Give up after this many seconds")]
        timeout: Option<u64>,
    },
    #[command(about = "Delete the features matching a query")]
    DeleteFeatures {
        #[arg(help = "Product id")]
        id: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        wait: WaitArgs,
    },
    #[command(
        about = "Generate shell completion scripts",
        after_help = r#"EXAMPLES
  $ geovector completion bash > ~/.local/share/bash-completion/completions/geovector
  $ geovector completion zsh > ~/.zfunc/_geovector"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn connect(remote: &RemoteArgs) -> Result<Arc<dyn VectorService>, Error> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &remote.url {
        config.base_url = url.clone();
    }
    if let Some(token) = &remote.token {
        config.token = Some(token.clone());
    }
    let mut client = VectorClient::new(config)?;
    if let Some(path) = &remote.tls_ca {
        client = client.with_tls_ca_file(path)?;
    }
    if remote.tls_skip_verify {
        client = client.with_tls_skip_verify();
    }
    Ok(Arc::new(client))
}

fn open(remote: &RemoteArgs, id: &str) -> Result<FeatureCollection, Error> {
    FeatureCollection::open(connect(remote)?, id)
}

fn read_input(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|err| {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Io,
        };
        Error::new(kind)
            .with_message(format!("failed to read {}", path.display()))
            .with_source(err)
    })
}

fn parse_json_input(text: &str, origin: &str) -> Result<Value, Error> {
    serde_json::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid JSON in {origin}"))
            .with_source(err)
    })
}

fn parse_geometry_arg(raw: &str) -> Result<Geometry, Error> {
    let (text, origin) = match raw.strip_prefix('@') {
        Some(path) => (read_input(Path::new(path))?, path.to_string()),
        None => (raw.to_string(), "--geometry".to_string()),
    };
    let value = parse_json_input(&text, &origin)?;
    if value.get("type").and_then(Value::as_str) == Some("Feature") {
        return Ok(Feature::from_geojson(&value)?.geometry);
    }
    Geometry::from_value(value)
}

/// Reads a GeoJSON Feature, FeatureCollection, or array of Features.
fn read_features(path: &Path) -> Result<Vec<Feature>, Error> {
    let origin = path.display().to_string();
    let value = parse_json_input(&read_input(path)?, &origin)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(ref map) if map.get("type") == Some(&json!("FeatureCollection")) => {
            match map.get("features") {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return Err(Error::new(ErrorKind::Usage).with_message(format!(
                        "{origin}: FeatureCollection has no features array"
                    )));
                }
            }
        }
        other => vec![other],
    };
    items.iter().map(Feature::from_geojson).collect()
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn add_auth_hint(err: Error) -> Error {
    if err.kind() == ErrorKind::Unauthorized && err.hint().is_none() {
        return err.with_hint("Set GEOVECTOR_TOKEN or pass --token.");
    }
    err
}
