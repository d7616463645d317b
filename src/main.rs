// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fix_clients::config::DEFAULT_CONFIG_PATH;
use fix_clients::db::{open_limit_or_empty, open_primary, seed_reference_data};
use fix_clients::{
    build_client_rows, create_client_table, import_clients, load_csv, AppConfig, SqliteClientStore,
    SqliteLimitStore,
};

#[derive(Parser)]
#[command(name = "fix-clients", version, about = "FIX client back-office")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the primary database and seed reference data
    Init,
    /// Import client sessions from a CSV file
    Import { csv: PathBuf },
    /// Write the client table spreadsheet
    Export { output: PathBuf },
    /// Browse the client table in the terminal (default)
    Tui,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Tui) {
        Command::Init => run_init(&config),
        Command::Import { csv } => run_import(&config, &csv),
        Command::Export { output } => run_export(&config, &output),
        Command::Tui => run_ui_mode(&config),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn run_init(config: &AppConfig) -> Result<()> {
    let db_path = &config.database.primary_path;
    ensure_parent_dir(db_path)?;

    let conn = open_primary(db_path).context("Failed to open primary store")?;
    let seeded = seed_reference_data(&conn)?;

    info!(path = %db_path.display(), seeded, "Database initialized");
    println!("✓ Database ready at {} ({} reference rows added)", db_path.display(), seeded);
    Ok(())
}

fn run_import(config: &AppConfig, csv_path: &Path) -> Result<()> {
    let db_path = &config.database.primary_path;
    ensure_parent_dir(db_path)?;

    let conn = open_primary(db_path).context("Failed to open primary store")?;
    seed_reference_data(&conn)?;

    let records = load_csv(csv_path)?;
    println!("✓ Loaded {} records from {}", records.len(), csv_path.display());

    let summary = import_clients(&SqliteClientStore::new(&conn), records)?;

    println!("✓ Added {} client sessions", summary.added);
    if !summary.rejected.is_empty() {
        println!("✗ Rejected {} records:", summary.rejected.len());
        for (line, reason) in &summary.rejected {
            println!("   line {}: {}", line, reason);
        }
    }

    Ok(())
}

fn run_export(config: &AppConfig, output: &Path) -> Result<()> {
    let conn = open_primary(&config.database.primary_path).context("Failed to open primary store")?;
    let limit_conn = open_limit_or_empty(&config.database.limit_path).context("Failed to open limit store")?;

    let rows = build_client_rows(&SqliteClientStore::new(&conn), &SqliteLimitStore::new(&limit_conn))?;
    let (book, _) = create_client_table(&config.export.template_path, &rows)?;

    ensure_parent_dir(output)?;
    umya_spreadsheet::writer::xlsx::write(&book, output)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", output.display(), e))?;

    println!("✓ Wrote {} rows to {}", rows.len(), output.display());
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    use fix_clients::ClientStore;

    let db_path = &config.database.primary_path;
    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: fix-clients init");
        std::process::exit(1);
    }

    let conn = open_primary(db_path).context("Failed to open primary store")?;
    let limit_conn = open_limit_or_empty(&config.database.limit_path).context("Failed to open limit store")?;

    let store = SqliteClientStore::new(&conn);
    let rows = build_client_rows(&store, &SqliteLimitStore::new(&limit_conn))?;
    let sessions = store.list_sessions()?;
    info!(rows = rows.len(), "Loaded client table");

    let mut app = ui::App::new(rows, sessions);
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web UI: cargo run --bin fix-clients-server --features server");
    std::process::exit(1);
}
