//! kv-streamer - inspect a key-value table and stream tables with a stored cursor.
//!
//! Quick start:
//!   kv-streamer --database app.db migrate up
//!   kv-streamer --database app.db set greeting hello
//!   kv-streamer --database app.db stream -t events -k events_cursor -p 3
//!   kv-streamer --database app.db cursor events_cursor

mod cli;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kv_streamer::application::{
    format_key_value_json, format_key_value_table, format_pass_summary, format_row_json,
    format_rows_table, read_current_page, reset_cursor, OutputFormat, Streamer,
    StreamerInitParams,
};
use kv_streamer::domain::{AppConfig, AppError, KeyValue, Result};
use kv_streamer::infrastructure::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, Database,
    KeyValueQ, SqliteTableSource,
};

use cli::{Cli, Commands, ConfigAction, MigrateDirection};

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> Result<()> {
    let format = cli
        .output_format()
        .map_err(|e| AppError::Config { message: e })?;

    let config = resolve_config(&cli)?;
    let db = Database::from_app_config(&config);

    match cli.command {
        Commands::Migrate { direction } => cmd_migrate(&db, direction)?,
        Commands::Get { key, must } => cmd_get(&db, &key, must, format)?,
        Commands::Set { key, value } => cmd_set(&db, key, value)?,
        Commands::Cursor { key } => cmd_cursor(&db, &key)?,
        Commands::Reset { key } => cmd_reset(&db, &key)?,
        Commands::Stream {
            table,
            order_by,
            cursor_key,
            batch_size,
            passes,
        } => {
            let batch_size = batch_size.unwrap_or(config.streamer.batch_size);
            cmd_stream(&db, &table, &order_by, cursor_key, batch_size, passes, format)?;
        }
        Commands::Config { action } => cmd_config(cli.config.as_deref(), &config, action)?,
    }

    Ok(())
}

/// Load the config file and apply command-line overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };

    if let Some(path) = &cli.database {
        config.database.path = Some(path.clone());
    }

    Ok(config)
}

/// Run the embedded migrations.
fn cmd_migrate(db: &Database, direction: MigrateDirection) -> Result<()> {
    let migrator = db.migrator();

    let (count, verb) = match direction {
        MigrateDirection::Up => (migrator.migrate_up()?, "Applied"),
        MigrateDirection::Down => (migrator.migrate_down()?, "Reverted"),
    };

    println!(
        "{} {} {} migration(s) on {}",
        "✓".green().bold(),
        verb,
        count,
        db.path().display()
    );

    Ok(())
}

/// Read a single key.
fn cmd_get(db: &Database, key: &str, must: bool, format: OutputFormat) -> Result<()> {
    let q = db.key_value_q()?;

    let kv = if must { q.must_get(key) } else { q.get(key)? };

    let Some(kv) = kv else {
        println!("{} Key '{}' not found", "∅".yellow(), key);
        return Ok(());
    };

    let output = match format {
        OutputFormat::Json => format_key_value_json(&kv).map_err(AppError::json)?,
        OutputFormat::Table => format_key_value_table(&kv),
    };

    println!("{output}");
    Ok(())
}

/// Insert or update a key.
fn cmd_set(db: &Database, key: String, value: String) -> Result<()> {
    let q = db.key_value_q()?;
    let kv = KeyValue::new(key, value);
    q.upsert(&kv)?;

    println!("{} {} = {}", "✓".green().bold(), kv.key.cyan(), kv.value);
    Ok(())
}

/// Show where a cursor is.
fn cmd_cursor(db: &Database, key: &str) -> Result<()> {
    let q = db.key_value_q()?;
    let page = read_current_page(&q, key)?;

    println!("Cursor '{}' is at page {}", key.cyan(), page.to_string().bold());
    Ok(())
}

/// Move a cursor back to the first page.
fn cmd_reset(db: &Database, key: &str) -> Result<()> {
    let q = db.key_value_q()?;
    reset_cursor(&q, key)?;

    println!("{} Cursor '{}' reset to page 0", "✓".green().bold(), key.cyan());
    Ok(())
}

/// Stream pages of a table.
fn cmd_stream(
    db: &Database,
    table: &str,
    order_by: &str,
    cursor_key: String,
    batch_size: u64,
    passes: usize,
    format: OutputFormat,
) -> Result<()> {
    let streamer = Streamer::new(StreamerInitParams {
        stream: SqliteTableSource::open(db, table, order_by)?,
        key_value_q: db.key_value_q()?,
        key_value_key: cursor_key,
        batch_size: Some(batch_size),
        context: None,
    })?;

    for pass in 1..=passes {
        let processed = match format {
            OutputFormat::Json => streamer.form_list_and_process(|_, row| {
                println!("{}", format_row_json(&row)?);
                Ok::<_, serde_json::Error>(())
            })?,
            OutputFormat::Table => {
                let rows = streamer.form_list()?;
                if !rows.is_empty() {
                    println!("{}", format_rows_table(&rows));
                }
                rows.len()
            }
        };

        let page = streamer.get_current_page()?;
        eprintln!(
            "{}",
            format_pass_summary(pass, streamer.key(), processed, page)
        );

        // Nothing to stream; further passes would print the same notice
        if processed == 0 {
            break;
        }
    }

    Ok(())
}

/// Manage the configuration file.
fn cmd_config(
    path: Option<&std::path::Path>,
    config: &AppConfig,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = path.map_or_else(config_file_path, std::path::Path::to_path_buf);
            if ensure_config_exists(&path)? {
                println!("{} Created {}", "✓".green().bold(), path.display());
            } else {
                println!("{} already exists", path.display());
            }
        }
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config).map_err(|e| AppError::Config {
                message: format!("Failed to serialize config: {e}"),
            })?;
            println!("# database: {}", config.database_path().display());
            println!("{content}");
        }
    }

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
