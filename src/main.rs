use anyhow::{Context, Result};
use clap::Parser;
use gemchat::ai::{Backend, HttpBackend};
use gemchat::chat::{ChatSession, ConversationSnapshot, ConversationStore, DispatchError};
use gemchat::commands::{self, Command, HELP_TEXT};
use gemchat::config::{self, Config};
use gemchat::probe::{ApiStatus, ConnectivityProbe};
use gemchat::render;
use gemchat::types::UserInput;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gemchat")]
#[command(about = "Terminal chat client for the Gemini gateway")]
#[command(long_about = "gemchat sends your messages, image prompts and files to a Gemini \
gateway and prints the replies as they arrive.\n\n\
Environment Variables:\n\
  GEMCHAT_API_URL               Gateway base URL (default http://localhost:8000)\n\
  GEMCHAT_PROBE_INTERVAL_SECS   Seconds between health checks (default 30)\n\
  GEMCHAT_REQUEST_TIMEOUT_SECS  Seconds before a request is given up (default 120)\n\n\
Values can also come from ./.env or the per-user gemchat/config.env.")]
struct Args {
    /// Gateway base URL, overrides GEMCHAT_API_URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Mirror the conversation into an HTML file, rewritten on every change
    #[arg(long, value_name = "PATH")]
    transcript: Option<PathBuf>,

    /// Do not poll the health endpoint
    #[arg(long)]
    no_probe: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn", value_name = "FILTER")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);
    // Must run before the runtime spawns worker threads
    config::load_dotenv();

    tokio::runtime::Runtime::new()
        .context("failed to start the async runtime")?
        .block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(url) = &args.api_url {
        config = config.with_api_url(url);
    }
    tracing::info!(api_url = %config.api_url, "starting");

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::from_config(&config));
    let session = ChatSession::new(Arc::clone(&backend));

    eprintln!("gemchat → {}", config.api_url);
    eprintln!("/help for commands, /quit to exit");

    let (shutdown, shutdown_rx) = watch::channel(false);
    let display = tokio::spawn(display_loop(
        Arc::clone(session.store()),
        args.transcript.clone(),
        shutdown_rx,
    ));

    let probe = if args.no_probe {
        None
    } else {
        let probe = Arc::new(ConnectivityProbe::from_config(backend, &config));
        let handle = Arc::clone(&probe).spawn();
        Some((probe, handle))
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut quit = false;
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse_command(&line) {
            Ok(command) => command,
            Err(usage) => {
                eprintln!("{usage}");
                continue;
            }
        };

        match command {
            Command::Quit => {
                quit = true;
                break;
            }
            Command::Help => println!("{HELP_TEXT}"),
            Command::Status => {
                let status = probe
                    .as_ref()
                    .map(|(probe, _)| probe.status())
                    .unwrap_or(ApiStatus::Unknown);
                println!("{status}");
            }
            Command::Send(text) => submit(&session, UserInput::text(text)),
            Command::Attach { path, text } => match commands::load_attachment(&path).await {
                Ok(attachment) => submit(&session, commands::attachment_input(attachment, &text)),
                Err(err) => eprintln!("{err:#}"),
            },
        }
    }

    // stdin closed: let replies that are already on their way land first
    if !quit {
        wait_for_replies(session.store()).await;
    }

    if let Some((_, handle)) = probe {
        handle.abort();
    }
    let _ = shutdown.send(true);
    if let Err(err) = display.await {
        tracing::warn!(error = %err, "display task ended abnormally");
    }
    Ok(())
}

/// Echo synchronously, then let the remote half run on its own task.
fn submit(session: &ChatSession, input: UserInput) {
    match session.begin(input) {
        Ok(pending) => {
            tokio::spawn(pending.complete());
        }
        Err(DispatchError::EmptyInput) => {}
    }
}

async fn wait_for_replies(store: &ConversationStore) {
    let mut updates = store.subscribe();
    while store.is_awaiting() {
        if updates.changed().await.is_err() {
            break;
        }
    }
}

/// Print every new message and mirror the page to `transcript` after each change.
/// After shutdown is signalled it makes one last pass and returns.
async fn display_loop(
    store: Arc<ConversationStore>,
    transcript: Option<PathBuf>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut updates = store.subscribe();
    let mut printed = 0;
    let mut typing_shown = false;
    let mut finished = false;

    loop {
        let fresh = store.messages_since(printed);
        printed += fresh.len();
        for message in &fresh {
            print!("{}", render::render_message(message));
        }

        let awaiting = store.is_awaiting();
        if awaiting && !typing_shown {
            println!("{}", render::TYPING_TEXT);
        }
        typing_shown = awaiting;

        if let Some(path) = &transcript {
            write_transcript(path, store.snapshot()).await;
        }

        if finished {
            break;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => finished = true,
        }
    }
}

/// Markdown and highlighting are CPU bound, so the page is built off the runtime threads.
async fn write_transcript(path: &Path, snapshot: ConversationSnapshot) {
    let page = match tokio::task::spawn_blocking(move || render::html_document(&snapshot)).await {
        Ok(page) => page,
        Err(err) => {
            tracing::warn!(error = %err, "transcript render failed");
            return;
        }
    };
    if let Err(err) = tokio::fs::write(path, page).await {
        tracing::warn!(path = %path.display(), error = %err, "failed to write transcript");
    }
}
