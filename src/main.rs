//! torivahti - marketplace watch bot: saved tori.fi searches with
//! new-listing notifications over Telegram.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use torivahti::config::Config;
use torivahti::db::Database;
use torivahti::dialogue::Dialogue;
use torivahti::error::{Result, VahtiError};
use torivahti::poller::{self, HttpSource};
use torivahti::telegram::{self, Telegram};

#[derive(Parser)]
#[command(name = "torivahti", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    let token = config.bot_token()?;
    let reference_dir = config.reference_dir();
    let interval = Duration::from_secs(config.poll_interval_secs());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\n\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| VahtiError::ConfigError(format!("Failed to set Ctrl+C handler: {}", e)))?;

    println!("\ntorivahti starting...\n");
    println!("  poll interval: {}s", interval.as_secs());
    println!("  reference data: {}", reference_dir.display());
    println!("\nPress Ctrl+C to stop.\n");

    // Poll scheduler on its own thread with its own connection; SQLite
    // connections are not shared across threads.
    let poller_handle = {
        let running = running.clone();
        let reference_dir = reference_dir.clone();
        let notifier = Telegram::new(token.clone());
        std::thread::spawn(move || -> Result<()> {
            let db = Database::open()?;
            poller::run_scheduler(
                &db,
                &HttpSource,
                &notifier,
                &reference_dir,
                interval,
                &running,
            );
            Ok(())
        })
    };

    // The conversation loop owns the main thread.
    let db = Database::open()?;
    let mut dialogue = Dialogue::new(db, reference_dir);
    let bot = Telegram::new(token);
    telegram::run_update_loop(&bot, &mut dialogue, &running);

    match poller_handle.join() {
        Ok(result) => result?,
        Err(_) => eprintln!("Error: poll thread panicked"),
    }
    println!("Stopped.");
    Ok(())
}
