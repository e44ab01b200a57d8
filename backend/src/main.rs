//! Bulkload CLI - Bulk entity import for the education admin console
//!
//! # Main Commands
//!
//! ```bash
//! bulkload serve                          # Start HTTP server (port 3000)
//! bulkload import school schools.csv      # Import a CSV through the backend
//! bulkload validate student students.csv  # Dry run, nothing is created
//! ```
//!
//! # Schema Commands
//!
//! ```bash
//! bulkload kinds                   # List importable entity kinds
//! bulkload columns teacher         # Show a kind's column contract
//! bulkload template district       # Write a header-only CSV template
//! ```

use bulkload::{
    config::{self, AppConfig},
    error::ConfigError,
    import::{validate_only, BulkImporter},
    schema,
    store::{BearerToken, RestConnector, StoreConnector},
    CheckResponse, EntityKind, UploadResponse,
};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "bulkload")]
#[command(about = "Bulk CSV import of districts, schools, students, teachers and content managers", long_about = None)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (default: BULKLOAD_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Admin backend URL (default: BULKLOAD_BACKEND_URL)
        #[arg(long)]
        backend_url: Option<String>,

        /// Rows processed concurrently per upload
        #[arg(long)]
        concurrency: Option<usize>,

        /// Use an in-memory store instead of the backend
        #[arg(long)]
        memory: bool,
    },

    /// List importable entity kinds
    Kinds,

    /// Show the column contract of an entity kind
    Columns {
        /// Entity kind (district, school, student, teacher, content-manager)
        kind: EntityKind,
    },

    /// Write the CSV template of an entity kind
    Template {
        /// Entity kind
        kind: EntityKind,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode and validate a CSV without creating anything
    Validate {
        /// Entity kind
        kind: EntityKind,

        /// Input CSV file
        input: PathBuf,

        /// Write the JSON report to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a CSV through the admin backend
    Import {
        /// Entity kind
        kind: EntityKind,

        /// Input CSV file
        input: PathBuf,

        /// Bearer token (default: BULKLOAD_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Admin backend URL (default: BULKLOAD_BACKEND_URL)
        #[arg(long)]
        backend_url: Option<String>,

        /// Rows processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write the JSON report to a file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Serve { port, backend_url, concurrency, memory } => {
            cmd_serve(port, backend_url, concurrency, memory).await
        }

        Commands::Kinds => cmd_kinds(),

        Commands::Columns { kind } => cmd_columns(kind),

        Commands::Template { kind, output } => cmd_template(kind, output.as_deref()),

        Commands::Validate { kind, input, output } => cmd_validate(kind, &input, output.as_deref()),

        Commands::Import { kind, input, token, backend_url, concurrency, output } => {
            cmd_import(kind, &input, token, backend_url, concurrency, output.as_deref()).await
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so JSON reports on stdout stay clean. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_config(
    backend_url: Option<String>,
    concurrency: Option<usize>,
) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::from_env()?;
    if backend_url.is_some() {
        config.backend_url = backend_url;
    }
    if let Some(n) = concurrency {
        config.concurrency = n.max(1);
    }
    Ok(config)
}

async fn cmd_serve(
    port: Option<u16>,
    backend_url: Option<String>,
    concurrency: Option<usize>,
    memory: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(backend_url, concurrency)?;
    if let Some(port) = port {
        config.port = port;
    }
    config.memory = memory;

    bulkload::server::start_server(config).await?;
    Ok(())
}

fn cmd_kinds() -> Result<(), Box<dyn std::error::Error>> {
    for kind in EntityKind::ALL {
        println!("{:<16} {}", kind.slug(), kind.label());
    }
    Ok(())
}

fn cmd_columns(kind: EntityKind) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", schema::describe(kind));
    Ok(())
}

fn cmd_template(kind: EntityKind, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let template = String::from_utf8(schema::template_for(kind))?;
    match output {
        Some(p) => {
            fs::write(p, &template)?;
            eprintln!("💾 Template written to: {}", p.display());
        }
        None => {
            eprintln!("📄 {} ({})", schema::template_filename(kind), kind.label());
            print!("{}", template);
        }
    }
    Ok(())
}

fn cmd_validate(
    kind: EntityKind,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating {} file: {}", kind.label(), input.display());

    let bytes = fs::read(input)?;
    let result = validate_only(&bytes, kind)?;
    let invalid = result.invalid_count;

    let response = CheckResponse::from(result);
    for row in response.results.iter().filter(|r| r.errors.is_some()).take(5) {
        eprintln!("\n❌ Row {} invalid:", row.row);
        for (field, messages) in row.errors.iter().flatten() {
            for message in messages.iter().take(3) {
                eprintln!("   - {}: {}", field, message);
            }
        }
    }

    eprintln!(
        "\n📊 Results: {} valid, {} invalid",
        response.summary.valid, response.summary.invalid
    );

    if let Some(path) = output {
        write_output(&serde_json::to_string_pretty(&response)?, Some(path))?;
    }

    if invalid > 0 {
        std::process::exit(1);
    }

    Ok(())
}

async fn cmd_import(
    kind: EntityKind,
    input: &Path,
    token: Option<String>,
    backend_url: Option<String>,
    concurrency: Option<usize>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing {} file: {}", kind.label(), input.display());

    let config = load_config(backend_url, concurrency)?;
    let token = token
        .or_else(config::token_from_env)
        .ok_or(ConfigError::MissingToken)?;

    let connector = RestConnector::new(config.rest_config()?)?;
    let store = connector.connect(&BearerToken::new(token)).await?;
    eprintln!("   Backend: {}", config.backend_url.as_deref().unwrap_or_default());

    let bytes = fs::read(input)?;
    let result = BulkImporter::new(store)
        .with_concurrency(config.concurrency)
        .run(&bytes, kind)
        .await?;

    let summary = result.summary;
    if summary.failed_count == 0 {
        eprintln!("\n✅ All {} rows created", summary.created_count);
    } else {
        eprintln!("\n   ✅ Created: {}", summary.created_count);
        eprintln!("   ❌ Failed: {}", summary.failed_count);
    }

    let response = UploadResponse::from(result);
    write_output(&serde_json::to_string_pretty(&response)?, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
