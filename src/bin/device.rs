//! `stockcount-device`: capture counts offline and sync them later.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use stockcount::models::TierQuantities;
use stockcount::queue::{
    sync::{sync_entries, EntryState, HttpSubmitter},
    Capture, CaptureContext, ImageInput, OfflineQueue, QueueError,
};

/// Offline count capture queue.
#[derive(Parser, Debug)]
#[command(name = "stockcount-device", about = "Offline stock count capture")]
struct Cli {
    /// Queue file.
    #[arg(long, env = "STOCKCOUNT_QUEUE", default_value = "stockcount-queue.redb")]
    queue: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a count into the queue.
    Capture(CaptureArgs),

    /// Show queued captures, oldest first.
    List,

    /// Upload queued captures.
    Sync {
        /// Server base URL.
        #[arg(long, env = "STOCKCOUNT_SERVER")]
        server: String,
        /// Bearer token.
        #[arg(long, env = "STOCKCOUNT_TOKEN", hide_env_values = true)]
        token: String,
        /// Only sync this entry.
        #[arg(long)]
        id: Option<String>,
        /// Request timeout in seconds.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Drop one queued capture.
    Remove {
        id: String,
    },

    /// Drop every queued capture.
    Clear {
        /// Required, this cannot be undone.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct CaptureArgs {
    #[arg(long)]
    event: Uuid,
    #[arg(long)]
    warehouse: String,
    #[arg(long)]
    stock_code: Option<String>,
    #[arg(long)]
    case_barcode: Option<String>,
    #[arg(long)]
    unit_barcode: Option<String>,
    #[arg(long)]
    lot: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    recount_task: Option<Uuid>,

    #[arg(long, default_value_t = 0)]
    singles_units: i64,
    #[arg(long, default_value_t = 0)]
    singles_cases: i64,
    #[arg(long, default_value_t = 0)]
    pick_face_layers: i64,
    #[arg(long, default_value_t = 0)]
    pick_face_cases: i64,
    #[arg(long, default_value_t = 0)]
    bulk_pallets: i64,
    #[arg(long, default_value_t = 0)]
    bulk_layers: i64,
    #[arg(long, default_value_t = 0)]
    bulk_cases: i64,

    /// Photo evidence file.
    #[arg(long)]
    photo: Option<PathBuf>,

    #[arg(long)]
    branch: Option<String>,
    #[arg(long)]
    location: Option<String>,
    /// Expiry date, YYYY-MM-DD.
    #[arg(long)]
    expiry: Option<NaiveDate>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), QueueError> {
    let queue = OfflineQueue::open(&cli.queue)?;

    match cli.command {
        Commands::Capture(args) => {
            let entry = queue.enqueue(args.into_capture()?)?;
            println!("queued {}", entry.id);
        }
        Commands::List => {
            let entries = queue.list()?;
            if entries.is_empty() {
                println!("queue is empty");
            }
            for entry in entries {
                println!(
                    "{}  {}  {}  {}  lot={}  photo={}",
                    entry.id,
                    entry.captured_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.warehouse_code,
                    entry.product_label(),
                    entry.lot_number.as_deref().unwrap_or("-"),
                    entry.image.as_ref().map(|i| i.filename.as_str()).unwrap_or("-"),
                );
            }
        }
        Commands::Sync {
            server,
            token,
            id,
            timeout,
        } => {
            let submitter = HttpSubmitter::new(&server, &token, Duration::from_secs(timeout))?;
            let report = sync_entries(&queue, &submitter, id.as_deref(), |entry, state| {
                match state {
                    EntryState::Syncing => println!("{}  syncing", entry.id),
                    EntryState::Synced {
                        count_id,
                        total_units,
                    } => println!("{}  synced as {} ({} units)", entry.id, count_id, total_units),
                    EntryState::Error(message) => println!("{}  error: {}", entry.id, message),
                }
            })
            .await?;

            println!(
                "{} synced, {} failed, {} still queued",
                report.synced.len(),
                report.failed.len(),
                queue.len()?
            );
            if report.auth_stopped {
                eprintln!("authentication rejected; log in again and re-run sync");
                std::process::exit(2);
            }
        }
        Commands::Remove { id } => {
            if queue.remove(&id)? {
                println!("removed {}", id);
            } else {
                return Err(QueueError::NotFound(id));
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                eprintln!("refusing to clear the queue without --yes");
                std::process::exit(2);
            }
            println!("removed {} capture(s)", queue.clear()?);
        }
    }

    Ok(())
}

impl CaptureArgs {
    fn into_capture(self) -> Result<Capture, QueueError> {
        let image = match &self.photo {
            Some(path) => Some(read_photo(path)?),
            None => None,
        };

        Ok(Capture {
            event_id: self.event,
            warehouse_code: self.warehouse,
            stock_code: self.stock_code,
            case_barcode: self.case_barcode,
            unit_barcode: self.unit_barcode,
            lot_number: self.lot,
            description: self.description,
            recount_task_id: self.recount_task,
            quantities: TierQuantities {
                singles_units: self.singles_units,
                singles_cases: self.singles_cases,
                pick_face_layers: self.pick_face_layers,
                pick_face_cases: self.pick_face_cases,
                bulk_pallets: self.bulk_pallets,
                bulk_layers: self.bulk_layers,
                bulk_cases: self.bulk_cases,
            },
            image,
            context: CaptureContext {
                branch: self.branch,
                location: self.location,
                expiry_date: self.expiry,
            },
        })
    }
}

fn read_photo(path: &Path) -> Result<ImageInput, QueueError> {
    let bytes = std::fs::read(path)
        .map_err(|e| QueueError::InvalidImage(format!("{}: {}", path.display(), e)))?;
    let modified_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());

    Ok(ImageInput::Binary {
        bytes,
        // Resolved from the extension or the bytes at enqueue
        mime_type: None,
        filename,
        modified_at,
    })
}
