//! AI Session Viewer - Entry Point
//!
//! Subcommands either drive a source CLI (`chat`, `quick`) or read its
//! on-disk session store (`projects`, `sessions`, `history`, `search`,
//! `stats`, `delete`). Listings are printed as JSON.

use asv::client::{ChatClient, QuickChatClient, Update};
use asv::config::{self, CliOverrides, ResolvedConfig};
use asv::loader::DataRoots;
use asv::model::{AppError, ContentBlock, Message, SessionId, SourceCli};
use asv::reducer::quick::QuickChatReducer;
use asv::reducer::SessionState;
use asv::transport::bus::EventBus;
use asv::transport::command::discover_installations;
use asv::transport::credentials::{CliSettings, ProviderCredentials};
use asv::transport::local::LocalTransport;
use asv::transport::quick::{HttpQuickChat, ProviderQuickChat, QuickChatTransport, QuickEvent};
use asv::transport::remote::RemoteTransport;
use asv::transport::ChatTransport;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// AI Session Viewer - chat with and browse Claude Code and Codex sessions
#[derive(Parser, Debug)]
#[command(name = "asv")]
#[command(version)]
#[command(about = "Chat with Claude Code and Codex CLIs and browse their session transcripts")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level regardless of RUST_LOG
    #[arg(long, global = true)]
    pub debug: bool,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one prompt through a CLI and print the streamed messages
    Chat {
        /// Source CLI (claude or codex)
        #[arg(long)]
        source: Option<SourceCli>,

        /// Working directory for the CLI (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Model passed to the CLI
        #[arg(long)]
        model: Option<String>,

        /// Chat server WebSocket URL; runs the CLI remotely
        #[arg(long)]
        remote: Option<String>,

        /// Continue an existing session instead of starting a new one
        #[arg(long, value_parser = parse_session_id)]
        resume: Option<SessionId>,

        /// Pass the CLI's permission bypass flag
        #[arg(long)]
        skip_permissions: bool,

        /// First message of the turn
        prompt: String,
    },

    /// Print one page of a persisted transcript as JSON
    History {
        /// Transcript format (claude or codex)
        #[arg(long)]
        source: SourceCli,

        /// Transcript path
        file: PathBuf,

        /// Zero-based page index
        #[arg(long, default_value = "0")]
        page: usize,

        /// Messages per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<usize>,

        /// Count pages back from the newest message
        #[arg(long)]
        from_end: bool,
    },

    /// Stream a one-shot reply straight from the provider API
    Quick {
        /// Provider to ask (claude or codex)
        #[arg(long)]
        source: Option<SourceCli>,

        /// Model id (falls back to the CLI's own configured model)
        #[arg(long)]
        model: Option<String>,

        /// Chat server quick-chat endpoint; calls the provider directly when unset
        #[arg(long)]
        url: Option<String>,

        /// Question to send
        prompt: String,
    },

    /// List models selectable for a CLI as JSON
    Models {
        /// Source CLI (claude or codex)
        #[arg(long)]
        source: Option<SourceCli>,
    },

    /// List projects that have session transcripts as JSON
    Projects {
        /// Source CLI (claude or codex)
        #[arg(long)]
        source: Option<SourceCli>,
    },

    /// List the sessions of one project as JSON
    Sessions {
        /// Source CLI (claude or codex)
        #[arg(long)]
        source: Option<SourceCli>,

        /// Project id as printed by `projects`
        project: String,
    },

    /// Search every transcript of a CLI for text
    Search {
        /// Source CLI (claude or codex)
        #[arg(long)]
        source: Option<SourceCli>,

        /// Case-insensitive text to look for
        query: String,

        /// Stop after this many matches
        #[arg(long, default_value = "50")]
        max_results: usize,
    },

    /// Print token usage totals as JSON
    Stats {
        /// Source CLI (claude or codex)
        #[arg(long)]
        source: Option<SourceCli>,
    },

    /// Delete one session transcript
    Delete {
        /// Transcript path (`.jsonl`)
        file: PathBuf,
    },

    /// List installed CLIs and their versions
    Clis,
}

fn parse_session_id(raw: &str) -> Result<SessionId, String> {
    SessionId::new(raw).map_err(|e| e.to_string())
}

impl Args {
    /// Flags that take part in the config precedence chain.
    fn overrides(&self) -> CliOverrides {
        match &self.command {
            Command::Chat {
                source,
                model,
                remote,
                skip_permissions,
                ..
            } => CliOverrides {
                source: *source,
                model: model.clone(),
                remote_url: remote.clone(),
                skip_permissions: *skip_permissions,
                ..CliOverrides::default()
            },
            Command::Quick {
                source, model, url, ..
            } => CliOverrides {
                source: *source,
                model: model.clone(),
                quick_chat_url: url.clone(),
                ..CliOverrides::default()
            },
            Command::History { source, .. } => CliOverrides {
                source: Some(*source),
                ..CliOverrides::default()
            },
            Command::Models { source }
            | Command::Projects { source }
            | Command::Sessions { source, .. }
            | Command::Search { source, .. }
            | Command::Stats { source } => CliOverrides {
                source: *source,
                ..CliOverrides::default()
            },
            Command::Delete { .. } | Command::Clis => CliOverrides::default(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, AppError> {
    // Defaults → Config File → Env Vars → CLI Args
    let config = config::resolve(args.config.clone(), args.overrides())?;

    asv::logging::init(&config.log_file_path, args.debug)?;

    info!(
        config = ?config,
        "Configuration loaded and resolved"
    );

    match args.command {
        Command::Chat {
            cwd,
            resume,
            prompt,
            ..
        } => run_chat(&config, cwd, resume, &prompt).await,
        Command::History {
            source,
            file,
            page,
            page_size,
            from_end,
        } => {
            let page_size = page_size
                .filter(|size| *size > 0)
                .unwrap_or(config.page_size);
            let page = asv::loader::load_page(source, &file, page, page_size, from_end)?;
            print_json(&page)
        }
        Command::Quick { prompt, .. } => run_quick(&config, &prompt).await,
        Command::Models { .. } => {
            let credentials = ProviderCredentials::discover();
            let models =
                asv::transport::models::list_models(config.default_source, &credentials).await;
            print_json(&models)
        }
        Command::Projects { .. } => {
            let roots = DataRoots::discover();
            print_json(&asv::loader::list_projects(&roots, config.default_source))
        }
        Command::Sessions { project, .. } => {
            let roots = DataRoots::discover();
            let sessions = asv::loader::list_sessions(&roots, config.default_source, &project)?;
            print_json(&sessions)
        }
        Command::Search {
            query, max_results, ..
        } => {
            let roots = DataRoots::discover();
            let hits =
                asv::loader::global_search(&roots, config.default_source, &query, max_results);
            print_json(&hits)
        }
        Command::Stats { .. } => {
            let roots = DataRoots::discover();
            print_json(&asv::loader::usage_stats(&roots, config.default_source)?)
        }
        Command::Delete { file } => {
            asv::loader::delete_session(&file)?;
            eprintln!("Deleted {}", file.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Clis => {
            let installations = discover_installations(&config.cli_paths).await;
            if installations.is_empty() {
                eprintln!("No claude or codex executable found");
                return Ok(ExitCode::FAILURE);
            }
            for found in installations {
                let settings = CliSettings::discover(found.source);
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    found.source,
                    found.path.display(),
                    found.version.as_deref().unwrap_or("unknown version"),
                    settings.masked_key(),
                    settings.config_path.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode, AppError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?;
    println!("{json}");
    Ok(ExitCode::SUCCESS)
}

// ===== Chat =====

async fn run_chat(
    config: &ResolvedConfig,
    cwd: Option<PathBuf>,
    resume: Option<SessionId>,
    prompt: &str,
) -> Result<ExitCode, AppError> {
    let transport: Arc<dyn ChatTransport> = match &config.remote_url {
        Some(url) => Arc::new(RemoteTransport::connect(url, config.reconnect_delay).await?),
        None => Arc::new(LocalTransport::new(config.cli_paths.clone())),
    };
    let cwd = match cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir()?,
    };
    let cwd = cwd.to_string_lossy().into_owned();

    let mut client = ChatClient::new(transport);
    let launched = match resume {
        Some(session_id) => {
            client.reducer_mut().attach(
                config.default_source,
                cwd,
                session_id.clone(),
                config.default_model.clone(),
                config.skip_permissions,
            )?;
            client.continue_session(&session_id, prompt, None).await
        }
        None => {
            client
                .start(
                    config.default_source,
                    cwd,
                    prompt,
                    config.default_model.clone(),
                    config.skip_permissions,
                )
                .await
        }
    };
    if let Err(err) = launched {
        eprintln!("error: {err}");
        return Ok(ExitCode::FAILURE);
    }

    // The prompt itself is already in the session; print only replies.
    let mut printed = client.session().messages().len();
    loop {
        let next = tokio::select! {
            update = client.next_update() => Some(update),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(next) = next else {
            warn!("Interrupted, cancelling reply");
            client.cancel().await;
            break;
        };
        let Some(update) = next else {
            break;
        };

        let messages = client.session().messages();
        for message in &messages[printed..] {
            print_message(message);
        }
        printed = messages.len();

        if let Update::Stderr {
            line,
            surfaced: true,
        } = &update
        {
            eprintln!("{line}");
        }
    }

    let session = client.session();
    let session_id = session
        .session_id()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    eprintln!("[{}] session {}", session.state().as_str(), session_id);
    if let Some(error) = session.last_error() {
        eprintln!("error: {error}");
    }

    Ok(match session.state() {
        SessionState::Errored => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn print_message(message: &Message) {
    println!("── {} ──", message.role().as_str());
    for block in message.content() {
        match block {
            ContentBlock::Text { text } => println!("{text}"),
            ContentBlock::Reasoning { text } => println!("[thinking] {text}"),
            ContentBlock::ToolInvocation(call) => {
                println!("[tool] {} {}", call.name(), call.input_serialized())
            }
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                let label = if *is_error { "tool error" } else { "result" };
                println!("[{label}] {content}");
            }
        }
    }
}

// ===== Quick chat =====

async fn run_quick(config: &ResolvedConfig, prompt: &str) -> Result<ExitCode, AppError> {
    let transport: Arc<dyn QuickChatTransport> = match &config.quick_chat_url {
        Some(url) => Arc::new(HttpQuickChat::new(url.clone())?),
        None => Arc::new(ProviderQuickChat::new(
            Arc::new(EventBus::new()),
            ProviderCredentials::discover(),
        )?),
    };
    let model = match config.default_model.as_str() {
        "" => CliSettings::discover(config.default_source)
            .default_model
            .unwrap_or_default(),
        model => model.to_string(),
    };
    let reducer = QuickChatReducer::new(config.default_source, model);
    let mut client = QuickChatClient::new(transport, reducer);

    if let Err(err) = client.send(prompt).await {
        eprintln!("error: {err}");
        return Ok(ExitCode::FAILURE);
    }

    let mut stdout = std::io::stdout();
    loop {
        let next = tokio::select! {
            event = client.next_update() => Some(event),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = next else {
            client.cancel();
            break;
        };
        match event {
            Some(QuickEvent::Chunk(text)) => {
                print!("{text}");
                stdout.flush()?;
            }
            Some(_) => {}
            None => break,
        }
    }
    println!();

    match client.reducer().last_error() {
        Some(error) => {
            eprintln!("error: {error}");
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}
