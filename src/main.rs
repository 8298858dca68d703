// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use tracing_subscriber::EnvFilter;

use spesometro::{auth, db, debit_sheet, format_cents, Config};

fn main() -> Result<()> {
    // Logs go to stderr; quiet by default so they don't fight the TUI
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::load()?;

    match args.get(1).map(String::as_str) {
        None | Some("ui") => run_ui_mode(&config, args.iter().any(|a| a == "--read-only")),
        Some("init") => run_init(&config),
        Some("boards") => run_boards(&config),
        Some("debits") => {
            let Some(board_id) = args.get(2) else {
                bail!("Usage: spesometro debits <board-id>");
            };
            run_debits(&config, board_id)
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: spesometro [ui [--read-only] | init | boards | debits <board-id>]");
            std::process::exit(2);
        }
    }
}

fn open(config: &Config) -> Result<Connection> {
    db::open_database(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))
}

fn run_init(config: &Config) -> Result<()> {
    println!("🗄️  Initializing {}", config.db_path.display());

    let conn = open(config)?;
    println!("✓ Schema ready (WAL mode)");

    match auth::ensure_admin(&conn, config.default_password.as_deref())? {
        Some(password) => println!("🔑 'admin' created! Password: {}", password),
        None => println!("✓ Admin account already present"),
    }

    Ok(())
}

fn run_boards(config: &Config) -> Result<()> {
    let conn = open(config)?;
    let boards = db::get_all_boards(&conn)?;

    if boards.is_empty() {
        println!("No boards yet.");
        return Ok(());
    }

    println!(
        "{:<34} {:<24} {:>8} {:>8} {:>12}",
        "ID", "Board", "Members", "Products", "Total"
    );
    for board in &boards {
        println!(
            "{:<34} {:<24} {:>8} {:>8} {:>12}",
            board.id,
            board.name,
            board.members.len(),
            board.products.len(),
            format_cents(board.total_price()),
        );
    }

    Ok(())
}

fn run_debits(config: &Config, board_id: &str) -> Result<()> {
    let conn = open(config)?;
    let board = db::get_board(&conn, board_id)?;
    let sheet = debit_sheet(&board);

    println!("📋 {}", board.name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{:<24} {:>10} {:>10} {:>10}", "Member", "Paid", "Debit", "Balance");
    for member in &sheet.members {
        println!(
            "{:<24} {:>10} {:>10} {:>10}",
            member.name,
            format_cents(member.paid),
            format_cents(member.debit),
            format_cents(member.balance),
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", sheet.summary());

    let drift = sheet.rounding_drift();
    if drift != 0 {
        println!("ℹ️  Rounding drift: {}", format_cents(drift));
    }
    if sheet.unassigned > 0 {
        println!("⚠️  {} is not covered by any member", format_cents(sheet.unassigned));
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config, read_only: bool) -> Result<()> {
    if !config.db_path.exists() {
        eprintln!("❌ Database not found at {}", config.db_path.display());
        eprintln!("   Run: spesometro init");
        std::process::exit(1);
    }

    let conn = open(config)?;
    let boards = db::get_all_boards(&conn)?;

    let mut app = ui::App::new(boards, !read_only);
    ui::run_ui(&conn, &mut app)?;

    println!("✅ UI closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config, _read_only: bool) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or start the API: cargo run --bin spesometro-server --features server");
    std::process::exit(1);
}
