use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use vod_console::client::{RecordRequest, WorkerClient};
use vod_console::extract::extract_video_id;
use vod_console::params::{self, ParamValue, WorkerBinary};
use vod_console::prefs::PrefStore;
use vod_console::reconcile::status_text;
use vod_console::{Error, Result};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_PREFS: &str = "vodc-prefs.toml";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Worker base URL; falls back to VODC_SERVER from the environment
    #[arg(long)]
    server: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Terminal control panel (submit + monitor)
    Tui {
        /// Preference file, carried across sessions
        #[arg(long, default_value = DEFAULT_PREFS)]
        prefs: PathBuf,
    },
    /// Print the worker's task table once
    Status,
    /// Print the resolved parameter snapshot for an advanced string
    Resolve {
        /// Free-form advanced parameter string
        #[arg(default_value = "")]
        advanced: String,
        #[arg(long, default_value = "ytdlp")]
        binary: String,
        #[arg(long, default_value = DEFAULT_PREFS)]
        prefs: PathBuf,
    },
    /// Submit one download without entering the panel
    Submit {
        /// Video ID or a watch/share URL
        video: String,
        #[arg(long, default_value = "best")]
        quality: String,
        #[arg(long, default_value = "ytdlp")]
        binary: String,
        #[arg(long, default_value = "")]
        advanced: String,
        /// Post-completion callback identifier (repeatable)
        #[arg(long)]
        callback: Vec<String>,
        #[arg(long, default_value = DEFAULT_PREFS)]
        prefs: PathBuf,
    },
    /// Ask the worker to update one of its download binaries
    Update {
        #[arg(default_value = "ytdlp")]
        binary: String,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    params::validate_tables()?;

    let server = args
        .server
        .or_else(|| std::env::var("VODC_SERVER").ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());

    init_tracing(matches!(args.cmd, Command::Tui { .. }));

    match args.cmd {
        Command::Tui { prefs } => vod_console::ui::run_tui(&server, &prefs),
        Command::Status => cmd_status(&server),
        Command::Resolve {
            advanced,
            binary,
            prefs,
        } => cmd_resolve(&advanced, &binary, &prefs),
        Command::Submit {
            video,
            quality,
            binary,
            advanced,
            callback,
            prefs,
        } => cmd_submit(&server, &video, &quality, &binary, &advanced, callback, &prefs),
        Command::Update { binary } => cmd_update(&server, &binary),
    }
}

// The panel owns the terminal, so its diagnostics go to a file next to
// nothing in particular; one-shot commands log to stderr.
fn init_tracing(tui: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if tui {
        let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("vodc.log")
        else {
            return;
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn parse_binary(s: &str) -> Result<WorkerBinary> {
    WorkerBinary::parse(s)
        .ok_or_else(|| Error::msg(format!("unknown binary '{s}' (expected ytdlp or ytarchive)")))
}

fn bindings_from_prefs(prefs: &PrefStore) -> BTreeMap<String, ParamValue> {
    params::DESCRIPTORS
        .iter()
        .map(|d| (d.key.to_string(), d.value_from_pref(prefs.get(d.key))))
        .collect()
}

fn cmd_status(server: &str) -> Result<()> {
    let client = WorkerClient::new(server)?;
    let tasks = client.status()?;
    if tasks.is_empty() {
        println!("no tasks");
        return Ok(());
    }
    for (i, (uid, rec)) in tasks.iter().enumerate() {
        let last = vod_console::log_render::render_lines(&rec.output)
            .into_iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default();
        println!(
            "{:>2}. {:<24} {:<9} {}",
            i + 1,
            uid,
            status_text(rec.status),
            last
        );
    }
    Ok(())
}

fn cmd_resolve(advanced: &str, binary: &str, prefs_path: &PathBuf) -> Result<()> {
    let binary = parse_binary(binary)?;
    let prefs = PrefStore::open(prefs_path);
    let bindings = bindings_from_prefs(&prefs);
    let resolved = params::resolve(&bindings, advanced, binary);

    for diag in &resolved.diagnostics {
        println!("# {diag}");
    }
    for (key, value) in &resolved.snapshot {
        let mark = if resolved.is_overridden(key) { " *" } else { "" };
        println!("{key} = {}{mark}", value.render());
    }
    if !resolved.overridden.is_empty() {
        println!("# * forced by the advanced parameter string");
    }
    Ok(())
}

fn cmd_submit(
    server: &str,
    video: &str,
    quality: &str,
    binary: &str,
    advanced: &str,
    callbacks: Vec<String>,
    prefs_path: &PathBuf,
) -> Result<()> {
    let binary = parse_binary(binary)?;
    let video_id = extract_video_id(video);
    if video_id.is_empty() {
        return Err(Error::msg("empty video id"));
    }

    let prefs = PrefStore::open(prefs_path);
    let bindings = bindings_from_prefs(&prefs);
    let resolved = params::resolve(&bindings, advanced, binary);
    for diag in &resolved.diagnostics {
        tracing::warn!(%diag, "advanced parameter diagnostic");
    }

    let client = WorkerClient::new(server)?;
    let id = client.record(&RecordRequest {
        youtube_id: video_id,
        quality: quality.to_string(),
        binary: binary.as_str().to_string(),
        params: resolved.snapshot,
        callbacks,
    })?;
    println!("task started: {id}");
    Ok(())
}

fn cmd_update(server: &str, binary: &str) -> Result<()> {
    let binary = parse_binary(binary)?;
    let client = WorkerClient::new(server)?;
    let message = client.update_binary(binary)?;
    println!("{message}");
    Ok(())
}
