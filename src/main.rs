use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use clap::Parser;
use expiring_posts::{
    Expirer, PolicyRegistry,
    clock::ManualClock,
    config::{self, ExpirerConfig},
    events::MemorySink,
    observability,
    scheduler::ManualScheduler,
    store::{MemoryStore, Record},
};

const DEFAULT_CONFIG_PATH: &str = "expiring-posts.toml";

/// CLI arguments for the expiring-posts tool
#[derive(Parser, Debug)]
#[command(version, about = "Policy-driven content expiration", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./expiring-posts.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Write a commented default configuration file
    Init {
        /// Path to create the config file (defaults to ./expiring-posts.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Load the configuration and print the resolved policies
    Validate,
    /// Run one expiration pass against records loaded from a JSON file
    ///
    /// Nothing outside the process is touched. The run result and every
    /// emitted event are printed as JSON.
    Simulate {
        /// JSON array of records
        #[arg(long)]
        records: String,
        /// Evaluate as of this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Init { output, force } => run_init(output, force),
        Command::Validate => run_validate(args.config.as_deref()),
        Command::Simulate { records, at } => {
            run_simulate(args.config.as_deref(), &records, at).await;
        }
    }
}

fn run_init(output: Option<String>, force: bool) {
    let output_path = PathBuf::from(output.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, config::default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To check it, run:");
    println!("  expiring-posts validate -c {}", output_path.display());
}

/// Load config and initialize logging, exiting on failure.
fn load_config(explicit_config_path: Option<&str>) -> (PathBuf, ExpirerConfig) {
    let config_path = PathBuf::from(explicit_config_path.unwrap_or(DEFAULT_CONFIG_PATH));

    let config = match ExpirerConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    (config_path, config)
}

fn run_validate(explicit_config_path: Option<&str>) {
    let (config_path, config) = load_config(explicit_config_path);

    let registry = PolicyRegistry::new();
    for (record_type, policy) in &config.expiration.policies {
        if let Err(e) = registry.register(record_type, policy.to_input()) {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    let settings = config.expiration.settings();
    println!("Config OK: {}", config_path.display());
    println!(
        "  enabled={} interval={}s page_size={} dry_run={}",
        config.expiration.enabled,
        settings.interval().num_seconds(),
        settings.page_size,
        settings.dry_run
    );

    let policies = registry.snapshot();
    if policies.is_empty() {
        println!("  no policies configured");
    }
    for (record_type, policy) in policies {
        let update = if policy.update_args.is_some() {
            " (with update fields)"
        } else {
            ""
        };
        println!(
            "  {}: {} after {}s{}",
            record_type, policy.action, policy.expire_after_secs, update
        );
    }
}

async fn run_simulate(
    explicit_config_path: Option<&str>,
    records_path: &str,
    at: Option<DateTime<Utc>>,
) {
    let (_, config) = load_config(explicit_config_path);

    let records: Vec<Record> = match std::fs::read_to_string(records_path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
    {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Failed to load records from {}: {}", records_path, e);
            std::process::exit(1);
        }
    };

    let clock = Arc::new(ManualClock::new(at.unwrap_or_else(Utc::now)));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    for record_type in config.expiration.policies.keys() {
        store.register_type(record_type.clone());
    }
    let record_count = records.len();
    for record in records {
        store.insert(record);
    }

    let scheduler = Arc::new(ManualScheduler::new());
    let sink = Arc::new(MemorySink::new());
    let expirer = Expirer::builder(store, scheduler)
        .config(&config.expiration)
        .clock(clock)
        .event_sink(sink.clone())
        .build();

    if let Err(e) = expirer.register_from_config(&config.expiration) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    tracing::info!(
        records = record_count,
        policies = expirer.post_types().len(),
        "Running simulated expiration pass"
    );

    let Some(result) = expirer.run_expiration_check().await else {
        eprintln!("Expiration pass was already running");
        std::process::exit(1);
    };

    let report = serde_json::json!({
        "result": result,
        "events": sink.events(),
    });
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize report: {}", e);
            std::process::exit(1);
        }
    }
}
