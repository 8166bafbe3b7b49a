//! Inspect and maintain stored session memory.
//!
//! Reads `RECOLLECT_*` environment variables for defaults (see
//! `ObserverConfig::from_env`).
//!
//! # Examples
//!
//! ```sh
//! # Print one session's observation log and continuity hints
//! recollect show session-1
//!
//! # Token estimates and counts for every stored session
//! recollect --dir ~/.recollect/sessions stats
//!
//! # Convert an old plain-text log to the structured form
//! recollect upgrade notes.md > session-1.json
//! ```

use clap::{Parser, Subcommand};
use recollect::config::ObserverConfig;
use recollect::context::estimate_log;
use recollect::memory::{
    FileStore, MemoryStore, SessionMemory, parse_legacy_log, render_observations,
};
use std::fmt::Write;
use std::path::PathBuf;
use std::process;
use tracing::{Level, debug};

/// Inspect and maintain recollect session memory.
#[derive(Parser)]
#[command(name = "recollect")]
struct Cli {
    /// Session storage directory (default: RECOLLECT_STORAGE_DIR or .recollect/sessions)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Log at DEBUG level to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a session's rendered observation log and hints
    Show {
        session: String,
    },
    /// Token estimates, counts and timestamps for one or all sessions
    Stats {
        session: Option<String>,
    },
    /// Convert a legacy plain-text log into structured JSON on stdout
    Upgrade {
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match run(&cli) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<String, String> {
    match &cli.command {
        Command::Show { session } => {
            let store = open_store(cli)?;
            let memory = store.load(session).map_err(|e| e.to_string())?;
            Ok(show(session, &memory))
        }
        Command::Stats { session } => {
            let store = open_store(cli)?;
            let sessions = match session {
                Some(s) => vec![s.clone()],
                None => store.list_sessions().map_err(|e| e.to_string())?,
            };
            if sessions.is_empty() {
                return Ok(format!("No sessions in {}\n", store.dir().display()));
            }
            let mut out = String::new();
            for id in &sessions {
                let memory = store.load(id).map_err(|e| e.to_string())?;
                out.push_str(&stats(id, &memory));
            }
            Ok(out)
        }
        Command::Upgrade { file } => {
            let text = std::fs::read_to_string(file)
                .map_err(|e| format!("failed to read '{}': {e}", file.display()))?;
            let memory = SessionMemory {
                observation_log: parse_legacy_log(&text),
                ..Default::default()
            };
            debug!(
                "Parsed {} group(s), {} entries from {}",
                memory.observation_log.len(),
                memory.entry_count(),
                file.display()
            );
            let json = serde_json::to_string_pretty(&memory)
                .map_err(|e| format!("failed to serialize: {e}"))?;
            Ok(format!("{json}\n"))
        }
    }
}

fn open_store(cli: &Cli) -> Result<FileStore, String> {
    let dir = cli
        .dir
        .clone()
        .unwrap_or_else(|| ObserverConfig::from_env().storage_dir);
    debug!("Using storage directory {}", dir.display());
    FileStore::new(&dir).map_err(|e| format!("failed to open '{}': {e}", dir.display()))
}

fn show(session: &str, memory: &SessionMemory) -> String {
    if memory.is_fresh() {
        return format!("{session}: nothing observed yet\n");
    }
    let mut out = render_observations(&memory.observation_log);
    if let Some(task) = &memory.current_task_hint {
        let _ = writeln!(out, "\nCurrent task: {task}");
    }
    if let Some(suggested) = &memory.suggested_response_hint {
        let _ = writeln!(out, "Suggested next response: {suggested}");
    }
    out
}

fn stats(session: &str, memory: &SessionMemory) -> String {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
    };
    let index = memory
        .last_observed_index
        .map_or_else(|| "none".to_string(), |i| i.to_string());
    format!(
        "{session}\n  groups: {}, entries: {}, log: ~{} tokens\n  observed through: #{index} (~{} tokens at last fold)\n  last observed: {}, last reflected: {}\n",
        memory.observation_log.len(),
        memory.entry_count(),
        estimate_log(&memory.observation_log),
        memory.last_observed_token_count,
        fmt_time(memory.last_observed_at),
        fmt_time(memory.last_reflected_at),
    )
}
