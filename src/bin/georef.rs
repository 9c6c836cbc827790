//! CLI binary for georef-pipeline.
//!
//! A thin shim over the library crate that maps flags and the deployment's
//! environment variables to `PipelineConfig`, wires the services and prints
//! one status per handled object.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use georef_pipeline::{
    BatchProgressCallback, DocumentStore, GeoLocateClient, GitHubConfig, GitHubDocumentStore,
    InvocationStatus, LlmVisionModel, Namespaces, NominatimGeocoder, ObjectDocumentStore,
    ObjectEvent, ObjectStore, Pipeline, PipelineConfig, ProgressCallback, RowLogTable, Services,
    StoreConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the batch plus a log line per finished object. Objects finish
/// out of order, so start times are keyed by object key.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} maps  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, key: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(key))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_objects: usize) {
        self.bar.set_length(total_objects as u64);
        self.bar.reset_eta();
    }

    fn on_object_start(&self, key: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(key.to_string(), Instant::now());
        }
        self.bar.set_message(key.to_string());
    }

    fn on_object_complete(&self, key: &str, status: &InvocationStatus) {
        let secs = dim(&format!("{:.1}s", self.elapsed_secs(key)));
        let line = match status {
            InvocationStatus::Failed { error, .. } => {
                // Keep very long messages to one terminal line.
                let msg = if error.chars().count() > 80 {
                    format!("{}\u{2026}", error.chars().take(79).collect::<String>())
                } else {
                    error.clone()
                };
                format!("  {} {}  {}  {}", red("✗"), key, red(&msg), secs)
            }
            InvocationStatus::Skipped { reason, .. } => {
                format!("  {} {}  {}", dim("–"), key, dim(reason))
            }
            InvocationStatus::Compressed { output_key, .. } => {
                format!("  {} {}  → {}  {}", green("✓"), key, output_key, secs)
            }
            InvocationStatus::Published { document_url, .. } => {
                format!("  {} {}  → {}  {}", green("✓"), key, document_url, secs)
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_objects: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} maps processed", green("✔"), bold(&total_objects.to_string()));
        } else {
            eprintln!(
                "{} {}/{} maps failed",
                red("✘"),
                bold(&failed.to_string()),
                total_objects
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compress one scan already in the store
  georef --root ./bucket compress "raw/map 0042.tif"

  # Handle an S3 notification document (stdin)
  georef --root ./bucket handle --event - < event.json

  # Process every raw scan, then rebuild the CSV
  georef --root ./bucket run

  # Rebuild the cumulative CSV from the row log
  georef --root ./bucket export-table

ENVIRONMENT VARIABLES:
  BUCKET_NAME             S3 bucket (build with --features s3)
  COMPRESSED_FOLDER       Namespace for compressed PNGs (default: compressed)
  ANALYSIS_FOLDER         Namespace for the metadata table (default: analysis)
  ERROR_FOLDER            Namespace for error records (default: error)
  COMPRESSION_TARGET_MB   Target PNG size in MB (default: 3)
  MODEL_ID                Vision model id
  MODEL_REGION            Model region (logged only)
  GITHUB_TOKEN            Publish GeoJSON to GitHub when set
  GITHUB_REPO_NAME        Target repository (default: water_resources_geojson)
  ANTHROPIC_API_KEY / OPENAI_API_KEY / GEMINI_API_KEY
                          Model provider credentials
"#;

#[derive(Parser, Debug)]
#[command(
    name = "georef",
    version,
    about = "Compress scanned maps and extract geo-referenced water-resource metadata",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Local directory acting as the bucket.
    #[arg(long, global = true, env = "GEOREF_ROOT", default_value = ".")]
    root: PathBuf,

    /// S3 bucket; overrides --root.
    #[cfg(feature = "s3")]
    #[arg(long, global = true, env = "BUCKET_NAME")]
    bucket: Option<String>,

    #[cfg(feature = "s3")]
    #[arg(long, global = true, env = "AWS_REGION")]
    aws_region: Option<String>,

    #[arg(long, global = true, env = "RAW_FOLDER", default_value = "raw")]
    raw_folder: String,

    #[arg(long, global = true, env = "COMPRESSED_FOLDER", default_value = "compressed")]
    compressed_folder: String,

    #[arg(long, global = true, env = "ANALYSIS_FOLDER", default_value = "analysis")]
    analysis_folder: String,

    #[arg(long, global = true, env = "ERROR_FOLDER", default_value = "error")]
    error_folder: String,

    /// Namespace for GeoJSON documents when no GitHub token is set.
    #[arg(long, global = true, env = "DOCUMENTS_FOLDER", default_value = "geojson")]
    documents_folder: String,

    #[arg(long, global = true, env = "COMPRESSION_TARGET_MB", default_value_t = 3.0)]
    target_mb: f64,

    #[arg(long, global = true, env = "MODEL_ID")]
    model: Option<String>,

    /// LLM provider; auto-detected from API key variables if not set.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    #[arg(long, global = true, env = "MODEL_REGION")]
    region: Option<String>,

    #[arg(long, global = true, env = "MODEL_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// File whose contents replace the built-in extraction prompt.
    #[arg(long, global = true, env = "PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, global = true, env = "GITHUB_REPO_NAME", default_value = "water_resources_geojson")]
    github_repo: String,

    #[arg(long, global = true, env = "GITHUB_OWNER")]
    github_owner: Option<String>,

    /// Seconds before a geocoding request is abandoned.
    #[arg(long, global = true, env = "GEOCODE_TIMEOUT", default_value_t = 10)]
    geocode_timeout: u64,

    #[arg(short, long, global = true, env = "GEOREF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print statuses as JSON lines on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, env = "GEOREF_NO_PROGRESS")]
    no_progress: bool,

    #[arg(short, long, global = true, env = "GEOREF_VERBOSE")]
    verbose: bool,

    #[arg(short, long, global = true, env = "GEOREF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress raw scans to size-bounded PNGs (no analysis).
    Compress {
        /// Object keys in the raw namespace.
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Route objects or a notification to their stage.
    Handle {
        /// S3 notification JSON file, or `-` for stdin.
        #[arg(long, conflicts_with = "keys")]
        event: Option<PathBuf>,
        /// Object keys.
        keys: Vec<String>,
        /// Also analyse PNGs written by the Compressor.
        #[arg(long)]
        chain: bool,
    },
    /// Process every object in the raw namespace, then export the table.
    Run,
    /// Render the metadata row log as the cumulative CSV.
    ExportTable,
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        #[cfg(feature = "s3")]
        {
            if let Some(bucket) = &self.bucket {
                return StoreConfig::S3 {
                    bucket: bucket.clone(),
                    region: self.aws_region.clone(),
                    endpoint: None,
                };
            }
        }
        StoreConfig::Fs {
            root: self.root.to_string_lossy().into_owned(),
        }
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let namespaces = Namespaces {
            raw: self.raw_folder.clone(),
            compressed: self.compressed_folder.clone(),
            analysis: self.analysis_folder.clone(),
            error: self.error_folder.clone(),
            documents: self.documents_folder.clone(),
        };
        let mut builder = PipelineConfig::builder()
            .namespaces(namespaces)
            .target_size_mb(self.target_mb)
            .max_tokens(self.max_tokens)
            .concurrency(self.concurrency);
        if let Some(model) = &self.model {
            builder = builder.model(model);
        }
        if let Some(provider) = &self.provider {
            builder = builder.provider_name(provider);
        }
        if let Some(region) = &self.region {
            builder = builder.model_region(region);
        }
        if let Some(path) = &self.prompt_file {
            let prompt = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt file {}", path.display()))?;
            builder = builder.prompt(prompt);
        }
        builder.build().context("Invalid configuration")
    }

    fn services(&self, config: &PipelineConfig, store: ObjectStore) -> Result<Services> {
        let model = LlmVisionModel::from_config(config).context("Failed to set up the vision model")?;
        let lookup = GeoLocateClient::new(&config.lookup_country, &config.lookup_state)?;
        let geocoder = NominatimGeocoder::new(
            concat!("georef-pipeline/", env!("CARGO_PKG_VERSION")),
            self.geocode_timeout,
        )
        .context("Failed to build the geocoding client")?;

        let documents: Arc<dyn DocumentStore> = match &self.github_token {
            Some(token) if !token.is_empty() => {
                let mut github = GitHubConfig::new(token);
                github.repository = self.github_repo.clone();
                github.owner = self.github_owner.clone();
                Arc::new(GitHubDocumentStore::new(github)?)
            }
            _ => {
                tracing::info!(
                    "GITHUB_TOKEN not set; documents go to the '{}' namespace",
                    config.namespaces.documents
                );
                Arc::new(ObjectDocumentStore::new(store.clone(), &config.namespaces.documents))
            }
        };

        Ok(Services {
            table: Arc::new(RowLogTable::new(store.clone(), &config.namespaces.analysis)),
            store,
            model: Arc::new(model),
            lookup: Arc::new(lookup),
            geocoder: Arc::new(geocoder),
            documents,
        })
    }
}

fn report(statuses: &[InvocationStatus], json: bool) -> usize {
    for status in statuses {
        if json {
            println!("{}", status.to_json());
        } else {
            match status {
                InvocationStatus::Skipped { key, reason } => println!("skipped    {key}  ({reason})"),
                InvocationStatus::Compressed {
                    key,
                    location,
                    size_bytes,
                    ..
                } => println!("compressed {key} → {location}  ({size_bytes} bytes)"),
                InvocationStatus::Published {
                    key,
                    document_url,
                    point_features,
                    ..
                } => println!("published  {key} → {document_url}  ({point_features} points)"),
                InvocationStatus::Failed { key, error, .. } => println!("failed     {key}: {error}"),
            }
        }
    }
    statuses.iter().filter(|s| s.is_failure()).count()
}

fn read_event(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during `run`.
    let show_progress =
        matches!(cli.command, Command::Run) && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.pipeline_config()?;
    let store = ObjectStore::new(cli.store_config()).context("Failed to open the object store")?;

    let failed = match &cli.command {
        Command::Compress { keys } => {
            let compressor = georef_pipeline::Compressor::new(config.clone(), store.clone());
            let events: Vec<ObjectEvent> = keys.iter().map(ObjectEvent::new).collect();
            report(&compressor.handle_all(&events).await, cli.json)
        }
        Command::Handle { event, keys, chain } => {
            let pipeline =
                Pipeline::new(config.clone(), cli.services(&config, store.clone())?).with_chaining(*chain);
            let statuses = match event {
                Some(path) => pipeline
                    .handle_notification(&read_event(path)?)
                    .await
                    .context("Invalid notification")?,
                None => {
                    let mut statuses = Vec::new();
                    for key in keys {
                        statuses.extend(pipeline.handle(&ObjectEvent::new(key)).await);
                    }
                    statuses
                }
            };
            report(&statuses, cli.json)
        }
        Command::Run => {
            let pipeline = Pipeline::new(config.clone(), cli.services(&config, store.clone())?);
            let events = pipeline.pending_raw().await.context("Failed to list raw objects")?;
            if events.is_empty() {
                eprintln!("Nothing to do: '{}' is empty", config.namespaces.raw);
                return Ok(());
            }
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as ProgressCallback)
            } else {
                None
            };
            let statuses = pipeline.run_batch(events, progress).await;
            let failed = if show_progress {
                statuses.iter().filter(|s| s.is_failure()).count()
            } else {
                report(&statuses, cli.json)
            };

            let table = RowLogTable::new(store.clone(), &config.namespaces.analysis);
            let rows = table
                .export_csv(&config.table_key())
                .await
                .context("Failed to export the metadata table")?;
            if !cli.quiet {
                eprintln!("{} rows → {}", rows, store.location(&config.table_key()));
            }
            failed
        }
        Command::ExportTable => {
            let table = RowLogTable::new(store.clone(), &config.namespaces.analysis);
            let rows = table
                .export_csv(&config.table_key())
                .await
                .context("Failed to export the metadata table")?;
            println!("{} rows → {}", rows, store.location(&config.table_key()));
            0
        }
    };

    if failed > 0 {
        bail!("{failed} object(s) failed; see the '{}' namespace", config.namespaces.error);
    }
    Ok(())
}
