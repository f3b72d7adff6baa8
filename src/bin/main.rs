//! Tabular CLI - answer tabular queries from the command line
//!
//! Usage:
//!   tabular query <query-string> [--debug] [--no-cache]
//!   tabular filter <query-string>
//!   tabular validate <query-string>
//!   tabular cache stats|clear
//!
//! Examples:
//!   tabular query 'data=12411:BEVSTD(GES)&region=11&time=2015:'
//!   tabular query 'data=12411:BEVSTD&layout=time&format=json' --no-cache
//!   tabular filter 'data=12411:BEVSTD(GES:GESW)&level=1,2'
//!
//! Configuration is read from `TABULAR_CONFIG`, `./tabular.toml` or
//! `~/.config/tabular/config.toml`; logs go to stderr and honour `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tabular::cache::SqliteCache;
use tabular::config::{expand_env_vars, Settings};
use tabular::filter::FilterCompiler;
use tabular::service::{error_response, Service};
use tabular::{NameList, Schema, TabularError};

#[derive(Parser)]
#[command(name = "tabular")]
#[command(about = "Tabular - query regional statistics as CSV, TSV or JSON tables")]
#[command(version)]
struct Cli {
    /// Path to a tabular.toml (overrides the default search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query and print the rendered table
    Query {
        /// URL query string, e.g. 'data=12411:BEVSTD&region=11'
        query: String,

        /// Print the cleaned query, search body and every output format
        #[arg(long)]
        debug: bool,

        /// Neither read nor write the result cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Print the search body a query compiles to
    Filter {
        /// URL query string
        query: String,
    },

    /// Validate a query and print its canonical form and cache keys
    Validate {
        /// URL query string
        query: String,
    },

    /// Inspect or clear the SQLite result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts and size
    Stats,
    /// Remove every entry
    Clear,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Query {
            query,
            debug,
            no_cache,
        } => cmd_query(&settings, &query, debug, no_cache),
        Commands::Filter { query } => cmd_filter(&settings, &query),
        Commands::Validate { query } => cmd_validate(&settings, &query),
        Commands::Cache { action } => cmd_cache(&settings, action),
    }
}

fn load_schema(settings: &Settings) -> Option<(Schema, NameList)> {
    let loaded = settings
        .schema
        .load_schema()
        .and_then(|schema| Ok((schema, settings.schema.load_names()?)));
    match loaded {
        Ok(loaded) => Some(loaded),
        Err(e) => {
            eprintln!("Error loading schema: {}", e);
            None
        }
    }
}

/// Print the `{"error": ...}` body for validation failures, a plain message
/// otherwise.
fn report_error(err: &TabularError) -> ExitCode {
    match error_response(err) {
        Some(body) => match serde_json::to_string(&body) {
            Ok(json) => println!("{}", json),
            Err(_) => eprintln!("{}", err),
        },
        None => eprintln!("Error: {}", err),
    }
    ExitCode::FAILURE
}

fn cmd_query(settings: &Settings, raw: &str, debug: bool, no_cache: bool) -> ExitCode {
    let Some((schema, names)) = load_schema(settings) else {
        return ExitCode::FAILURE;
    };
    let store = match settings.store.open() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening fact store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache = if no_cache || debug {
        None
    } else {
        match settings.cache.open(&settings.store.index) {
            Ok(cache) => cache,
            Err(e) => {
                eprintln!("Error opening cache: {}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    let mut service = Service::new(&schema, &names, &store);
    if let Some(cache) = &cache {
        service = service.with_cache(cache.as_ref());
    }

    if debug {
        return match service.debug(raw) {
            Ok(report) => match serde_json::to_string_pretty(&report) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => report_error(&e.into()),
            },
            Err(e) => report_error(&e),
        };
    }

    match service.handle(raw) {
        Ok(response) => {
            print!("{}", response.content);
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn cmd_filter(settings: &Settings, raw: &str) -> ExitCode {
    let Some((schema, names)) = load_schema(settings) else {
        return ExitCode::FAILURE;
    };
    let query = match tabular::CanonicalQuery::parse(raw, &schema, &names) {
        Ok(query) => query,
        Err(e) => return report_error(&e.into()),
    };

    let body = FilterCompiler::new(&schema, &query).body();
    match serde_json::to_string_pretty(&body) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e.into()),
    }
}

fn cmd_validate(settings: &Settings, raw: &str) -> ExitCode {
    let Some((schema, names)) = load_schema(settings) else {
        return ExitCode::FAILURE;
    };
    let query = match tabular::CanonicalQuery::parse(raw, &schema, &names) {
        Ok(query) => query,
        Err(e) => return report_error(&e.into()),
    };

    let summary = (|| -> Result<serde_json::Value, serde_json::Error> {
        Ok(serde_json::json!({
            "definition": query.definition()?,
            "render_key": query.render_key()?,
            "data_key": query.data_key()?,
        }))
    })();
    match summary.and_then(|s| serde_json::to_string_pretty(&s)) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e.into()),
    }
}

fn cmd_cache(settings: &Settings, action: CacheAction) -> ExitCode {
    let path = match &settings.cache.path {
        Some(path) => expand_env_vars(path).map(PathBuf::from).map_err(|e| e.to_string()),
        None => SqliteCache::default_path().map_err(|e| e.to_string()),
    };
    let cache = match path.and_then(|p| SqliteCache::open(&p).map_err(|e| e.to_string())) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Error opening cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match action {
        CacheAction::Stats => cache.stats().map(|stats| {
            println!("Concrete entries: {}", stats.concrete_entries);
            println!("Base entries:     {}", stats.base_entries);
            println!("Total size:       {} bytes", stats.total_size_bytes);
        }),
        CacheAction::Clear => cache.clear_all().map(|n| println!("Removed {} entries", n)),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Cache error: {}", e);
            ExitCode::FAILURE
        }
    }
}
