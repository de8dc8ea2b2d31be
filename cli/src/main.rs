//! MultiDrive - Command-line interface for the cloud transfer engine.
//!
//! Uploads, downloads, lists and copies files between the local filesystem,
//! OneDrive and Google Drive. Progress goes to stderr; listings and quota
//! reports go to stdout.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use engine::{
    connect, create_job, list_remote, plan_remote, plan_upload, run_copy, run_download,
    run_upload, Action, CancelToken, Drive, EngineConfig, ItemState, JobOptions,
    ProgressCallback, ProviderKind, TransferItem, TransferJob,
};
use tracing_subscriber::EnvFilter;

/// MultiDrive - move files to, from and between cloud drives
#[derive(Parser, Debug)]
#[command(name = "multidrive")]
#[command(version = "0.1.0")]
#[command(about = "Upload, download, list and copy files on OneDrive and Google Drive")]
struct Args {
    /// Storage service: onedrive or googledrive
    #[arg(short = 's', long, value_name = "SERVICE")]
    source: String,

    /// Action: upload, download, list, copy or quota
    #[arg(short = 'a', long, value_name = "ACTION")]
    action: String,

    /// Destination service for copy
    #[arg(short = 'd', long, value_name = "SERVICE")]
    destination: Option<String>,

    /// Local file or folder (upload source, download target)
    #[arg(short = 'l', long, value_name = "PATH")]
    local: Option<PathBuf>,

    /// Remote path on the source service
    #[arg(short = 'r', long, value_name = "PATH")]
    remote: Option<String>,

    /// Create missing destination folders
    #[arg(short = 'c', long)]
    createfolder: bool,

    /// Remote folder on the destination service for copy
    #[arg(short = 'e', long, value_name = "PATH")]
    secondaryremote: Option<String>,

    /// Replace existing files
    #[arg(short = 'o', long)]
    overwrite: bool,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding <service>_token.json files
    #[arg(long, value_name = "DIR")]
    token_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// A validated request, built before any network activity.
#[derive(Debug, PartialEq)]
enum Command {
    Upload {
        service: ProviderKind,
        local: PathBuf,
        remote: String,
    },
    Download {
        service: ProviderKind,
        remote: String,
        local: PathBuf,
    },
    List {
        service: ProviderKind,
        remote: String,
    },
    Copy {
        from: ProviderKind,
        to: ProviderKind,
        remote: String,
        destination: String,
    },
    Quota {
        service: ProviderKind,
    },
}

/// CLI implementation of ProgressCallback for displaying transfer progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Mutex<Instant>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        let now = Instant::now();
        CliProgress {
            verbose,
            start_time: now,
            last_progress_update: Mutex::new(now),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl ProgressCallback for CliProgress {
    fn on_job_started(&self, job: &TransferJob) {
        eprintln!("Preparing {}...", job.action);
        eprintln!("  Source: {}", job.source);
        eprintln!("  Destination: {}", job.destination);
        eprintln!(
            "  Total: {} across {} items",
            Self::format_bytes(job.total_bytes),
            job.items.len()
        );
        eprintln!();
    }

    fn on_item_started(&self, _job: &TransferJob, index: usize, item: &TransferItem) {
        if self.verbose {
            eprintln!("[{:3}] Starting: {}", index, item.display_path());
        }
    }

    fn on_bytes(&self, name: &str, done: u64, total: u64) {
        // Throttle progress updates (max once per 200ms) but always show the last chunk
        let Ok(mut last) = self.last_progress_update.lock() else {
            return;
        };
        if done < total && last.elapsed().as_millis() < 200 {
            return;
        }
        *last = Instant::now();

        let percent = if total == 0 {
            100
        } else {
            (done as f64 / total as f64 * 100.0) as u32
        };
        eprint!(
            "\r{}: {} | {}/{}",
            name,
            Self::print_progress_bar(percent),
            Self::format_bytes(done),
            Self::format_bytes(total)
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn on_attempt_failed(&self, name: &str, attempt: u32, reason: &str) {
        eprintln!();
        eprintln!("Attempt {} for {} failed, retrying: {}", attempt, name, reason);
    }

    fn on_item_completed(&self, _job: &TransferJob, index: usize, item: &TransferItem) {
        if self.verbose {
            let status = match item.state {
                ItemState::Done => "Done",
                ItemState::Failed => "Failed",
                _ => "Unknown",
            };
            eprintln!();
            eprintln!("[{:3}] {}: {}", index, status, item.display_path());
        }
    }

    fn on_job_completed(&self, job: &TransferJob) {
        eprintln!();
        let done = job.items.iter().filter(|i| i.state == ItemState::Done).count();
        let failed = job.items.iter().find(|i| i.state == ItemState::Failed);

        if failed.is_none() {
            eprintln!("Transfer complete!");
        }
        eprintln!("Summary: {} of {} items done", done, job.items.len());
        eprintln!("Bytes transferred: {}", Self::format_bytes(job.bytes_transferred));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));

        if let Some(item) = failed {
            eprintln!();
            match &item.error_message {
                Some(msg) => eprintln!("Failed: {}: {}", item.display_path(), msg),
                None => eprintln!("Failed: {}: (unknown error)", item.display_path()),
            }
        }
    }
}

/// Parse and validate command-line arguments, then run the action
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let exit_code = match run_cli(&args, &cancel) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Diagnostics go to stderr; RUST_LOG applies unless --verbose asks for debug.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancel `cancel` on the first Ctrl-C; in-flight retries and chunks stop at
/// their next check.
fn cancel_on_ctrl_c(cancel: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_io().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "Ctrl-C handling unavailable");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!();
                    eprintln!("Interrupted, cancelling transfer...");
                    cancel.cancel();
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Ctrl-C handling unavailable");
    }
}

fn parse_service(value: &str) -> Result<ProviderKind, String> {
    value.parse::<ProviderKind>().map_err(|e| e.to_string())
}

fn required<'a, T: ?Sized>(value: Option<&'a T>, flag: &str, action: &str) -> Result<&'a T, String> {
    value.ok_or_else(|| format!("Action '{}' requires {}", action, flag))
}

/// Check the arguments without touching the network.
fn build_command(args: &Args) -> Result<Command, String> {
    let service = parse_service(&args.source)?;
    let action = args.action.to_lowercase();

    let command = match action.as_str() {
        "upload" => {
            let local = required(args.local.as_deref(), "--local", &action)?;
            if !local.exists() {
                return Err(format!("Local path does not exist: {}", local.display()));
            }
            Command::Upload {
                service,
                local: local.to_path_buf(),
                remote: args.remote.clone().unwrap_or_default(),
            }
        }
        "download" => {
            let remote = required(args.remote.as_deref(), "--remote", &action)?;
            let local = args.local.clone().unwrap_or_else(|| PathBuf::from("."));
            if local.is_file() {
                return Err(format!("Local destination is a file: {}", local.display()));
            }
            Command::Download {
                service,
                remote: remote.to_string(),
                local,
            }
        }
        "list" => Command::List {
            service,
            remote: args.remote.clone().unwrap_or_default(),
        },
        "copy" => {
            let to = parse_service(required(args.destination.as_deref(), "--destination", &action)?)?;
            if to == service {
                return Err(format!(
                    "Copy needs two different services; both are {}",
                    service
                ));
            }
            let remote = required(args.remote.as_deref(), "--remote", &action)?;
            let destination = required(args.secondaryremote.as_deref(), "--secondaryremote", &action)?;
            Command::Copy {
                from: service,
                to,
                remote: remote.to_string(),
                destination: destination.to_string(),
            }
        }
        "quota" => Command::Quota { service },
        _ => {
            return Err(format!(
                "Invalid action '{}'. Must be 'upload', 'download', 'list', 'copy' or 'quota'",
                args.action
            ))
        }
    };
    Ok(command)
}

fn load_config(args: &Args) -> Result<EngineConfig, String> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.token_dir {
        config.token_dir = dir.clone();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, cancel: &CancelToken) -> Result<(), String> {
    let command = build_command(args)?;
    let config = load_config(args)?;
    let open = |kind: ProviderKind| {
        connect(kind, &config, cancel.clone()).map_err(|e| format!("Cannot connect to {}: {}", kind, e))
    };

    let options = JobOptions {
        overwrite: args.overwrite,
        create_folder: args.createfolder,
        max_attempts: config.whole_transfer_attempts,
    };
    let progress = CliProgress::new(args.verbose);

    match command {
        Command::Upload { service, local, remote } => {
            let drive = open(service)?;
            let source = local.to_string_lossy();
            let mut job = create_job(Action::Upload, &source, &remote, options)
                .map_err(|e| format!("Job creation failed: {}", e))?;
            plan_upload(&mut job).map_err(|e| format!("Job planning failed: {}", e))?;
            run_upload(&mut job, &drive, Some(&progress))
                .map_err(|e| format!("Upload failed: {}", e))
        }
        Command::Download { service, remote, local } => {
            let drive = open(service)?;
            let destination = local.to_string_lossy();
            let mut job = create_job(Action::Download, &remote, &destination, options)
                .map_err(|e| format!("Job creation failed: {}", e))?;
            plan_remote(&mut job, &drive).map_err(|e| format!("Job planning failed: {}", e))?;
            run_download(&mut job, &drive, Some(&progress))
                .map_err(|e| format!("Download failed: {}", e))
        }
        Command::List { service, remote } => {
            let drive = open(service)?;
            for path in list_remote(&drive, &remote).map_err(|e| format!("List failed: {}", e))? {
                println!("{}", path);
            }
            Ok(())
        }
        Command::Copy { from, to, remote, destination } => {
            let source: Drive = open(from)?;
            let target: Drive = open(to)?;
            let mut job = create_job(Action::Copy, &remote, &destination, options)
                .map_err(|e| format!("Job creation failed: {}", e))?;
            plan_remote(&mut job, &source).map_err(|e| format!("Job planning failed: {}", e))?;
            run_copy(&mut job, &source, &target, Some(&progress))
                .map_err(|e| format!("Copy failed: {}", e))
        }
        Command::Quota { service } => {
            let drive = open(service)?;
            let quota = drive.quota().map_err(|e| format!("Quota failed: {}", e))?;
            let show = |value: Option<u64>| {
                value.map_or_else(|| "unlimited".to_string(), CliProgress::format_bytes)
            };
            println!("Total: {}", show(quota.total));
            println!("Used: {}", CliProgress::format_bytes(quota.used));
            println!("Remaining: {}", show(quota.remaining));
            Ok(())
        }
    }
}
