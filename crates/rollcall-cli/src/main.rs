use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rollcall_core::ledger::{DATE_FORMAT, TIME_FORMAT};
use rollcall_core::{AttendanceLedger, LabelStore, MarkOutcome};
use rollcall_hw::Camera;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod enroll;
mod keys;
mod recognize;
mod voice;

use config::Config;
use voice::Voice;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture face samples for a person and add them to the label store
    Enroll {
        /// Name recorded in the attendance ledger
        #[arg(short, long)]
        name: String,
    },
    /// Recognize faces from the camera and mark attendance on confirm
    Recognize,
    /// Mark attendance for a name without the camera
    Mark {
        name: String,
    },
    /// Print a day's attendance ledger
    Show {
        /// Date as DD-MM-YYYY (default: today)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// List enrolled names and their sample counts
    List,
    /// Remove every sample enrolled under a name
    Remove {
        name: String,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Enroll { name } => {
            let mut rx = key_channel();
            tokio::task::spawn_blocking(move || enroll::run(&config, &name, &mut rx)).await??;
        }
        Commands::Recognize => {
            let mut rx = key_channel();
            tokio::task::spawn_blocking(move || recognize::run(&config, &mut rx)).await??;
        }
        Commands::Mark { name } => {
            let ledger = AttendanceLedger::new(&config.attendance_dir).with_match_rule(config.ledger_match);
            let voice = Voice::new(config.tts_command.as_deref());
            match ledger.mark(&name).context("failed to record attendance")? {
                MarkOutcome::Marked => voice.say(&format!("Attendance taken for {}", name.trim())),
                MarkOutcome::AlreadyMarked => voice.say(&format!("Already marked for {}", name.trim())),
            }
        }
        Commands::Show { date } => {
            let date = match date {
                Some(d) => NaiveDate::parse_from_str(&d, DATE_FORMAT)
                    .with_context(|| format!("invalid date {d:?}, expected DD-MM-YYYY"))?,
                None => Local::now().date_naive(),
            };
            let ledger = AttendanceLedger::new(&config.attendance_dir);
            let records = ledger.records(date)?;
            let label = date.format(DATE_FORMAT);
            if records.is_empty() {
                println!("No attendance records for {label}.");
            } else {
                println!("Attendance for {label}");
                for record in &records {
                    println!("  {:<30} {}", record.name, record.time.format(TIME_FORMAT));
                }
                println!("Total entries: {}", records.len());
            }
        }
        Commands::List => {
            let set = LabelStore::new(&config.data_dir).load_or_empty()?;
            if set.is_empty() {
                println!("No faces enrolled.");
            } else {
                for (name, count) in set.summary() {
                    println!("  {name:<30} {count} samples");
                }
                println!("Total samples: {}", set.len());
            }
        }
        Commands::Remove { name } => {
            let removed = LabelStore::new(&config.data_dir).remove(name.trim())?;
            println!("Removed {removed} samples for '{}'.", name.trim());
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found.");
            }
            for dev in devices {
                println!("  {}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

/// Operator keys from stdin and Ctrl-C.
fn key_channel() -> mpsc::Receiver<keys::Key> {
    let (tx, rx) = mpsc::channel(16);
    keys::forward_ctrl_c(tx.clone());
    keys::spawn_stdin_reader(tx);
    rx
}
