//! BloxPieceHub - Main Entry Point
//!
//! Command-line front end for the key banks. `run` keeps the hub open,
//! polling service status and updates in the background while reading
//! commands from stdin.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use bloxpiece_hub_lib::{
    bank::BankStore,
    commands,
    config::{Endpoints, Settings},
    logging,
    status::StatusPoller,
    storage::BankFile,
    sync::{HubClient, RemoteSource},
    updater::{ProcessRelauncher, SelfUpdater},
    version::{CheckOutcome, UpdatePhase, VersionPoller},
    AppState,
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the key bank file and logs.
    #[arg(long, env = "BPH_DATA_DIR", value_hint = clap::ValueHint::DirPath)]
    data_dir: Option<PathBuf>,

    /// Base URL of the hub's status, version and release files.
    #[arg(long, env = "BPH_REMOTE_URL")]
    remote_url: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List key banks.
    Banks,
    /// Create an empty key bank.
    Create {
        name: String,
        /// Make the new bank the active one.
        #[arg(long)]
        switch: bool,
    },
    /// Delete a key bank.
    Delete { name: Option<String> },
    /// Add keys to a bank. Reads one key per line from stdin when none are given.
    Add {
        #[arg(long)]
        bank: Option<String>,
        keys: Vec<String>,
    },
    /// Remove a random key from a bank and print it.
    Use {
        #[arg(long)]
        bank: Option<String>,
    },
    /// Print a random key without removing it.
    Copy {
        #[arg(long)]
        bank: Option<String>,
    },
    /// Fetch and show service status.
    Status,
    /// Compare this build with the latest release.
    Version,
    /// Install the latest release if it is newer, then restart.
    Update,
    /// Keep running with background status and update checks.
    Run,
}

struct Hub {
    state: AppState,
    status: StatusPoller,
    version: VersionPoller,
}

/// Environment settings with command line overrides applied
fn settings(args: &Args) -> Settings {
    let mut settings = Settings::from_env();
    if let Some(dir) = &args.data_dir {
        settings.data_dir = dir.clone();
    }
    if let Some(base) = &args.remote_url {
        settings.endpoints = Endpoints::from_base(base);
    }
    settings
}

fn build(args: &Args) -> anyhow::Result<Hub> {
    let settings = settings(args);

    let store = Arc::new(BankStore::load(
        BankFile::new(settings.keys_file()),
        &settings.default_bank,
    ));
    if let Some(e) = store.load_error() {
        warn!("Started with an empty bank because the bank file could not be read: {}", e);
    }

    let remote: Arc<dyn RemoteSource> = Arc::new(
        HubClient::new(
            settings.endpoints.clone(),
            settings.request_timeout,
            settings.download_timeout,
        )
        .context("creating HTTP client")?,
    );

    let updater = SelfUpdater::for_current_exe(Arc::new(ProcessRelauncher::from_current_args()))
        .context("locating executable")?;

    let status = StatusPoller::new(remote.clone(), settings.status_interval);
    let version = VersionPoller::new(remote, store.clone(), updater, settings.version_interval);

    let state = AppState {
        status: status.subscribe(),
        version: version.subscribe_info(),
        phase: version.subscribe_phase(),
        settings,
        store,
    };

    Ok(Hub {
        state,
        status,
        version,
    })
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(out) => println!("{}", out),
            Err(e) => error!("Failed to encode output: {}", e),
        }
    } else {
        println!("{}", text(value));
    }
}

fn print_banks(state: &AppState, json: bool) {
    print(json, &commands::list_banks(state), |banks| {
        banks
            .iter()
            .map(|b| {
                let marker = if b.active { "*" } else { " " };
                format!("{} {} ({} keys)", marker, b.name, b.key_count)
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
}

fn print_services(state: &AppState, json: bool) {
    print(json, &commands::service_statuses(state), |rows| {
        rows.iter()
            .map(|r| format!("[{}] {:<12} {:<8} {}  {}", r.category, r.name, r.state, r.discord, r.website))
            .collect::<Vec<_>>()
            .join("\n")
    });
}

fn print_version(state: &AppState, json: bool) {
    print(json, &commands::version_status(state), |v| {
        let latest = v.latest.as_deref().unwrap_or("unknown");
        if v.update_available {
            format!("current {}, latest {} (update available)", v.current, latest)
        } else {
            format!("current {}, latest {}", v.current, latest)
        }
    });
}

fn run_once(hub: &Hub, command: &Command, json: bool) -> Result<(), String> {
    let state = &hub.state;
    match command {
        Command::Banks => print_banks(state, json),
        Command::Create { name, switch } => {
            commands::create_bank(state, name, *switch)?;
            print_banks(state, json);
        }
        Command::Delete { name } => {
            let active = commands::delete_bank(state, name.as_deref())?;
            if !json {
                println!("Active bank: {}", active);
            }
        }
        Command::Add { bank, keys } => {
            let text = if keys.is_empty() {
                let mut input = String::new();
                std::io::stdin()
                    .read_to_string(&mut input)
                    .map_err(|e| e.to_string())?;
                input
            } else {
                keys.join("\n")
            };
            let result = commands::add_keys_text(state, bank.as_deref(), &text)?;
            print(json, &result, |r| format!("Added {} keys to {} ({} total)", r.added, r.bank, r.total));
        }
        Command::Use { bank } => {
            let key = commands::use_key(state, bank.as_deref())?;
            print(json, &key, |k| k.key.clone());
        }
        Command::Copy { bank } => {
            let key = commands::copy_key(state, bank.as_deref())?;
            print(json, &key, |k| k.key.clone());
        }
        Command::Status | Command::Version | Command::Update | Command::Run => {}
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let hub = build(&args)?;

    match &args.command {
        Command::Status => {
            if let Err(e) = hub.status.poll().await {
                warn!("Failed to update status: {}", e);
                eprintln!("Status unavailable: {}", e);
            }
            print_services(&hub.state, args.json);
        }
        Command::Version => {
            if let Err(e) = hub.version.check_version().await {
                eprintln!("Version check failed: {}", e);
            }
            print_version(&hub.state, args.json);
        }
        Command::Update => match hub.version.check_once().await {
            Ok(CheckOutcome::Relaunched(relaunched)) => relaunched.terminate(),
            Ok(CheckOutcome::AlreadyInstalled(v)) => println!("Version {} is installed; restart to use it", v),
            Ok(CheckOutcome::UpToDate) => print_version(&hub.state, args.json),
            Err(e) => anyhow::bail!("update failed: {}", e),
        },
        Command::Run => interactive(hub, args.json).await?,
        command => run_once(&hub, command, args.json).map_err(anyhow::Error::msg)?,
    }

    Ok(())
}

const HELP: &str = "commands: banks | switch <bank> | create <bank> | delete [bank] | add <key> | use | copy | status | version | quit";

async fn interactive(hub: Hub, json: bool) -> anyhow::Result<()> {
    let Hub {
        state,
        status,
        version,
    } = hub;
    let mut status_rx = state.status.clone();
    let mut phase_rx = state.phase.clone();

    let status_task = status.spawn();
    let version_task = version.spawn();

    println!("BloxPieceHub {} - {}", env!("CARGO_PKG_VERSION"), HELP);
    print_banks(&state, json);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&state, line.trim(), json) {
                    break;
                }
            }
            Ok(()) = status_rx.changed() => {
                status_rx.borrow_and_update();
                print_services(&state, json);
            }
            Ok(()) = phase_rx.changed() => {
                let phase = phase_rx.borrow_and_update().clone();
                match phase {
                    UpdatePhase::UpdateAvailable(v) => println!("Installing update {}...", v),
                    UpdatePhase::Relaunching => println!("Restarting into the new version..."),
                    _ => {}
                }
            }
        }
    }

    status_task.abort();
    version_task.abort();
    info!("Hub closed");
    Ok(())
}

/// Returns `false` when the session should end
fn handle_line(state: &AppState, line: &str, json: bool) -> bool {
    let (word, rest) = split_command(line);

    let result = match word {
        "" => return true,
        "quit" | "exit" => return false,
        "banks" => {
            print_banks(state, json);
            Ok(())
        }
        "switch" => commands::switch_bank(state, rest).map(|()| print_banks(state, json)),
        "create" => commands::create_bank(state, rest, true).map(|()| print_banks(state, json)),
        "delete" => {
            let name = (!rest.is_empty()).then_some(rest);
            commands::delete_bank(state, name).map(|active| println!("Active bank: {}", active))
        }
        "add" => commands::add_keys_text(state, None, rest)
            .map(|r| println!("Added {} keys to {} ({} total)", r.added, r.bank, r.total)),
        "use" => commands::use_key(state, None).map(|k| println!("Used key: {}", k.key)),
        "copy" => commands::copy_key(state, None).map(|k| println!("Key: {}", k.key)),
        "status" => {
            print_services(state, json);
            Ok(())
        }
        "version" => {
            print_version(state, json);
            Ok(())
        }
        _ => Err(HELP.to_string()),
    };

    if let Err(message) = result {
        eprintln!("{}", message);
    }
    true
}

/// Split a line into its command word and the trimmed remainder.
///
/// The remainder is one argument, so bank names and keys may contain spaces.
fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    logging::init(&settings(&args).log_dir());
    info!("BloxPieceHub {} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_remainder_is_a_single_argument() {
        assert_eq!(split_command("add  abc def "), ("add", "abc def"));
        assert_eq!(split_command("create My Bank"), ("create", "My Bank"));
        assert_eq!(split_command("  use"), ("use", ""));
        assert_eq!(split_command("   "), ("", ""));
    }

    #[test]
    fn log_dir_follows_data_dir_override() {
        let args = Args::parse_from(["bloxpiece-hub", "--data-dir", "/tmp/hub", "banks"]);
        assert_eq!(settings(&args).log_dir(), std::path::Path::new("/tmp/hub").join("logs"));
    }
}
