//! Flux CLI - Command-line interface for Storefront Flux
//!
//! Commands:
//! - decide: Resolve a visit into a content/layout decision
//! - replay: Replay recorded interactions through the event pipeline (NDJSON in, NDJSON batches out)
//! - config: Print or check configuration
//! - schema: Describe the payloads Flux consumes and produces

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_flux::behavior::{
    BatchSink, BufferSink, EventPipeline, EventStore, FileStore, HandleOutcome, InteractionTarget,
    MemoryStore, NdjsonSink, RawInteraction,
};
use storefront_flux::{FluxConfig, FluxError, IntentEngine, VisitContext, FLUX_VERSION, PRODUCER_NAME};

/// Flux - On-device storefront personalization and session telemetry
#[derive(Parser)]
#[command(name = "flux")]
#[command(version = FLUX_VERSION)]
#[command(about = "Resolve visitor intent and replay storefront interactions", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a visit into a decision
    Decide {
        /// Visit JSON file (use - for stdin)
        #[arg(short, long, conflicts_with = "url")]
        input: Option<PathBuf>,

        /// Landing URL or query string instead of visit JSON
        #[arg(long)]
        url: Option<String>,

        /// Referrer URL (with --url)
        #[arg(long, default_value = "")]
        referrer: String,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty-print the decision
        #[arg(long)]
        pretty: bool,
    },

    /// Replay NDJSON interactions through the event pipeline
    Replay {
        /// Interaction NDJSON file (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Batch NDJSON output (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override ledger batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override dedup window in milliseconds
        #[arg(long)]
        dedup_window_ms: Option<u64>,

        /// Active content variant id
        #[arg(long, default_value = "default")]
        variant: String,

        /// Session id (random when omitted)
        #[arg(long)]
        session_id: Option<String>,

        /// Persist the queue snapshot under this directory
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Print ledger stats to stderr when done
        #[arg(long)]
        stats: bool,
    },

    /// Print the default configuration, or check a configuration file
    Config {
        /// Configuration file to validate
        #[arg(long)]
        check: Option<PathBuf>,
    },

    /// Describe a payload
    Schema {
        #[arg(value_enum)]
        payload: PayloadType,

        /// Print a generated example instead of the description
        #[arg(long)]
        example: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PayloadType {
    /// Visit context input
    Visit,
    /// Decision output
    Decision,
    /// Raw interaction input
    Interaction,
    /// Event batch output
    Batch,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .without_time(),
        )
        .init();
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    match cli.command {
        Commands::Decide {
            input,
            url,
            referrer,
            config,
            pretty,
        } => cmd_decide(input.as_deref(), url.as_deref(), &referrer, config.as_deref(), pretty),

        Commands::Replay {
            input,
            output,
            config,
            batch_size,
            dedup_window_ms,
            variant,
            session_id,
            store_dir,
            stats,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(size) = batch_size {
                config.ledger.batch_size = size;
            }
            if let Some(window) = dedup_window_ms {
                config.ledger.dedup_window_ms = window;
            }
            config.validate()?;

            let options = ReplayOptions {
                variant,
                session_id,
                stats,
            };
            cmd_replay(&input, &output, &config, store_dir.as_deref(), &options)
        }

        Commands::Config { check } => cmd_config(check.as_deref()),

        Commands::Schema { payload, example } => cmd_schema(payload, example),
    }
}

fn cmd_decide(
    input: Option<&Path>,
    url: Option<&str>,
    referrer: &str,
    config: Option<&Path>,
    pretty: bool,
) -> Result<(), FluxCliError> {
    let config = load_config(config)?;
    let engine = IntentEngine::from_config(&config);

    let visit = match url {
        Some(url) => VisitContext::from_url(url, referrer),
        None => {
            let path = input.unwrap_or(Path::new("-"));
            if is_stdin(path) && atty::is(atty::Stream::Stdin) {
                return Err(FluxCliError::NoInput);
            }
            let visit_json = read_input(path)?;
            serde_json::from_str(&visit_json)
                .map_err(|e| FluxError::ParseError(format!("Failed to parse visit: {}", e)))?
        }
    };

    let decision = engine.decide(&visit);
    debug!(category = %decision.category, confidence = %decision.confidence, "decision resolved");

    if pretty {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        println!("{}", serde_json::to_string(&decision)?);
    }
    Ok(())
}

struct ReplayOptions {
    variant: String,
    session_id: Option<String>,
    stats: bool,
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    config: &FluxConfig,
    store_dir: Option<&Path>,
    options: &ReplayOptions,
) -> Result<(), FluxCliError> {
    let interactions = read_interactions(input)?;
    if interactions.is_empty() {
        return Err(FluxCliError::NoInteractions);
    }

    let writer: Box<dyn Write> = if is_stdin(output) {
        Box::new(io::stdout())
    } else {
        Box::new(fs::File::create(output)?)
    };
    let sink = NdjsonSink::new(writer);

    match store_dir {
        Some(dir) => replay(&interactions, config, FileStore::open(dir)?, sink, options),
        None => replay(&interactions, config, MemoryStore::new(), sink, options),
    }
}

fn replay(
    interactions: &[RawInteraction],
    config: &FluxConfig,
    store: impl EventStore + 'static,
    sink: impl BatchSink + 'static,
    options: &ReplayOptions,
) -> Result<(), FluxCliError> {
    let start = interactions.first().map(|i| i.timestamp).unwrap_or_else(Utc::now);
    let mut pipeline = EventPipeline::new(config, store, sink, start);
    if let Some(session_id) = &options.session_id {
        pipeline = pipeline.with_session_id(session_id);
    }
    pipeline.set_active_variant(&options.variant);
    pipeline.attach(start);

    let mut recorded = 0usize;
    let mut ignored = 0usize;
    let mut last = start;

    for interaction in interactions {
        // Timers fire before the interaction that follows them
        pipeline.tick(interaction.timestamp);
        match pipeline.handle(interaction) {
            HandleOutcome::Recorded { .. } => recorded += 1,
            HandleOutcome::Ignored | HandleOutcome::NotAttached => ignored += 1,
        }
        last = last.max(interaction.timestamp);
    }

    pipeline.destroy(last);
    info!(recorded, ignored, session_id = pipeline.session_id(), "replay finished");

    if options.stats {
        eprintln!("{}", serde_json::to_string(&pipeline.stats())?);
    }
    Ok(())
}

fn cmd_config(check: Option<&Path>) -> Result<(), FluxCliError> {
    match check {
        Some(path) => {
            let config = FluxConfig::from_json(&fs::read_to_string(path)?)?;
            println!(
                "Configuration OK (batch_size={}, dedup_window_ms={}, frustration threshold={})",
                config.ledger.batch_size, config.ledger.dedup_window_ms, config.frustration.threshold
            );
        }
        None => println!("{}", FluxConfig::default().to_json()?),
    }
    Ok(())
}

fn cmd_schema(payload: PayloadType, example: bool) -> Result<(), FluxCliError> {
    if example {
        println!("{}", example_payload(payload)?);
        return Ok(());
    }

    match payload {
        PayloadType::Visit => {
            println!("Visit context ({} {})", PRODUCER_NAME, FLUX_VERSION);
            println!();
            println!("Either form is accepted:");
            println!("  {{ \"params\": {{ \"utm_campaign\": \"..\", \"q\": \"..\" }}, \"referrer\": \"..\" }}");
            println!("  {{ \"url\": \"https://shop.example/?utm_source=..\", \"referrer\": \"..\" }}");
            println!();
            println!("Recognized parameters:");
            println!("  intent, force_intent          explicit override");
            println!("  utm_campaign, campaign        campaign");
            println!("  utm_source, source, ref       traffic source");
            println!("  utm_medium, medium            medium");
            println!("  q, query, search, s, utm_term, keyword   search");
            println!("  category, cat, tag, collection           category tag");
        }
        PayloadType::Decision => {
            println!("Decision");
            println!();
            println!("- category, confidence (high | medium | low)");
            println!("- template_id, funnel_stage (ready_to_buy | comparing | exploring)");
            println!("- headline, subheadline, badge, hero_asset_key");
            println!("- cta: {{ text, link, priority (primary | secondary | soft) }}");
            println!("- section_order: three of products, comparison, trust");
            println!("- score_board: {{ category: score }}");
            println!("- reasoning, edge_case_notes[], reasoning_log[]");
        }
        PayloadType::Interaction => {
            println!("Raw interaction (one per NDJSON line)");
            println!();
            println!("- timestamp: RFC 3339");
            println!("- path: page path (default /)");
            println!("- kind: click | tap | keyboard (default click)");
            println!("- target: {{ tag, text, class_list[], id, aria_label, role, href,");
            println!("            data_attributes{{}}, parent{{..}} }}");
        }
        PayloadType::Batch => {
            println!("Event batch (one per NDJSON line)");
            println!();
            println!("- id, session_id, flushed_at");
            println!("- trigger: batch_full | visibility_hidden | page_unload | idle | interval | manual");
            println!("- dedup_stats: {{ duplicates_dropped, tracked_ids }}");
            println!("- events[]: {{ id, event_type, category_or_variant_id, cumulative_session_score,");
            println!("              path, is_friction, timestamp, session_id, semantic_score,");
            println!("              element, middleware_data }}");
        }
    }
    Ok(())
}

fn example_payload(payload: PayloadType) -> Result<String, FluxCliError> {
    let visit = VisitContext::from_url(
        "https://shop.example/?utm_source=twitch&utm_campaign=rgb-week",
        "",
    );
    let interaction = RawInteraction::click(
        InteractionTarget::new("span").within(
            InteractionTarget::new("button")
                .with_id("add-headset")
                .with_text("Add to cart")
                .with_aria_label("Add gaming headset to cart"),
        ),
        Utc::now(),
    )
    .on_path("/collections/gaming");

    let json = match payload {
        PayloadType::Visit => serde_json::to_string_pretty(&visit)?,
        PayloadType::Decision => serde_json::to_string_pretty(&IntentEngine::new().decide(&visit))?,
        PayloadType::Interaction => serde_json::to_string_pretty(&interaction)?,
        PayloadType::Batch => {
            let sink = BufferSink::new();
            let mut pipeline = EventPipeline::new(
                &FluxConfig::default(),
                MemoryStore::new(),
                sink.clone(),
                interaction.timestamp,
            );
            pipeline.attach(interaction.timestamp);
            pipeline.handle(&interaction);
            pipeline.destroy(interaction.timestamp);
            serde_json::to_string_pretty(&sink.drain())?
        }
    };
    Ok(json)
}

// Helper functions

fn is_stdin(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_input(path: &Path) -> Result<String, FluxCliError> {
    if is_stdin(path) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn read_interactions(path: &Path) -> Result<Vec<RawInteraction>, FluxCliError> {
    let reader: Box<dyn BufRead> = if is_stdin(path) {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(path)?))
    };

    let mut interactions = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let interaction: RawInteraction = serde_json::from_str(trimmed).map_err(|e| {
            FluxCliError::ParseError(format!("Failed to parse interaction on line {}: {}", index + 1, e))
        })?;
        interactions.push(interaction);
    }
    Ok(interactions)
}

fn load_config(path: Option<&Path>) -> Result<FluxConfig, FluxCliError> {
    match path {
        Some(path) => Ok(FluxConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(FluxConfig::default()),
    }
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Flux(FluxError),
    Store(storefront_flux::StoreError),
    Json(serde_json::Error),
    NoInput,
    NoInteractions,
    ParseError(String),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<FluxError> for FluxCliError {
    fn from(e: FluxError) -> Self {
        FluxCliError::Flux(e)
    }
}

impl From<storefront_flux::StoreError> for FluxCliError {
    fn from(e: storefront_flux::StoreError) -> Self {
        FluxCliError::Store(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Flux(e @ FluxError::ConfigError(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'flux config' to see the default configuration".to_string()),
            },
            FluxCliError::Flux(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'flux schema visit' or 'flux schema interaction' for the expected format".to_string()),
            },
            FluxCliError::Store(e) => CliError {
                code: "STORE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that --store-dir is writable".to_string()),
            },
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "No visit provided".to_string(),
                hint: Some("Pass --url, --input <file>, or pipe visit JSON on stdin".to_string()),
            },
            FluxCliError::NoInteractions => CliError {
                code: "NO_INTERACTIONS".to_string(),
                message: "No interactions found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FluxCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}
