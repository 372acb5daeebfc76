//! bench-api - CLI client for a promptbench server
//!
//! Provides command-line access to the workbench REST API plus a `watch`
//! mode that runs the full synchronization core against a live session.

mod client;
mod config;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tabled::{Table, Tabled};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::{NativeApiClient, WsChangeConnector};
use session_sync::{ConnectionState, ControllerEvent, PersistenceTransport, SessionController};
use shared::{Session, SessionId, WorkbenchApi};

const DEFAULT_SERVER: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(name = "bench-api")]
#[command(about = "Command-line client for a promptbench server", long_about = None)]
struct Cli {
    /// Server URL (falls back to the config file, then localhost)
    #[arg(short, long, env = "PROMPTBENCH_SERVER")]
    server: Option<String>,

    /// Output format
    #[arg(short, long)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Pretty,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is reachable
    Ping,

    /// Session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Set a session's prompt text
    Prompt {
        session_id: String,
        text: String,
    },

    /// Generate a new response for a session's current prompt
    Respond {
        session_id: String,
    },

    /// Abort a running response
    Abort {
        session_id: String,
        response_id: String,
    },

    /// Append a reply to a response
    Reply {
        session_id: String,
        response_id: String,
        text: String,
    },

    /// Follow a session live: change notifications and connectivity
    Watch {
        session_id: String,
    },

    /// List available models
    Models {
        /// Rescan the model directory first
        #[arg(long)]
        scan: bool,
    },

    /// List available prompt templates
    Templates,

    /// List available sampling presets
    Presets,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List all sessions
    List,
    /// Get a specific session
    Get { id: String },
    /// Create a new session
    New,
    /// Delete a session
    Delete { id: String },
}

#[derive(Tabled)]
struct SessionRow {
    id: String,
    title: String,
    created: String,
}

#[derive(Tabled)]
struct CatalogRow {
    id: String,
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let file_config = config::load_config();
    let server = cli
        .server
        .clone()
        .or_else(|| file_config.server.clone())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let format = cli
        .format
        .or_else(|| parse_format(file_config.format.as_deref()?))
        .unwrap_or_default();

    let api = Arc::new(NativeApiClient::new(&server));

    match cli.command {
        Commands::Ping => {
            api.ping().await?;
            println!("{}", "server is up".green());
        }

        Commands::Session { action } => match action {
            SessionAction::List => {
                let overview = api.session_overview().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&overview)?)
                    }
                    OutputFormat::Table => {
                        let rows: Vec<SessionRow> = overview
                            .session_summaries
                            .iter()
                            .map(|s| SessionRow {
                                id: s.id.to_string(),
                                title: s.title.clone(),
                                created: s.creation_timestamp.to_rfc3339(),
                            })
                            .collect();
                        println!("{}", Table::new(rows));
                    }
                    OutputFormat::Pretty => {
                        for s in &overview.session_summaries {
                            println!("{}  {}", s.id.to_string().cyan(), s.title);
                        }
                    }
                }
            }
            SessionAction::Get { id } => {
                let session = api.get_session(&SessionId::from(id)).await?;
                if format == OutputFormat::Json {
                    println!("{}", serde_json::to_string_pretty(&session)?);
                } else {
                    print_session(&session);
                }
            }
            SessionAction::New => {
                let session = api.create_session(None).await?;
                println!("{} {}", "created".green(), session.id);
            }
            SessionAction::Delete { id } => {
                api.delete_session(&SessionId::from(id)).await?;
                println!("{}", "deleted".green());
            }
        },

        Commands::Prompt { session_id, text } => {
            // A one-shot process has nothing queued, so this is a direct
            // field write rather than an enqueue.
            api.write_field(
                &SessionId::from(session_id),
                session_sync::PROMPT_FIELD,
                &text,
            )
            .await?;
            println!("{}", "prompt saved".green());
        }

        Commands::Respond { session_id } => {
            let response = api.create_response(&SessionId::from(session_id)).await?;
            println!("{} {}", "response started".green(), response.id);
        }

        Commands::Abort {
            session_id,
            response_id,
        } => {
            api.abort_response(&SessionId::from(session_id), &response_id)
                .await?;
            println!("{}", "abort requested".yellow());
        }

        Commands::Reply {
            session_id,
            response_id,
            text,
        } => {
            api.create_message(&SessionId::from(session_id), &response_id, &text)
                .await?;
            println!("{}", "reply sent".green());
        }

        Commands::Watch { session_id } => {
            let connector = WsChangeConnector::new(&server);
            watch(api, connector, SessionId::from(session_id)).await?;
        }

        Commands::Models { scan } => {
            let overview = if scan {
                api.scan_models().await?
            } else {
                api.model_overview().await?
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&overview)?),
                OutputFormat::Table => {
                    let rows: Vec<CatalogRow> = overview
                        .models
                        .iter()
                        .map(|m| CatalogRow {
                            id: m.id.clone(),
                            name: m.name.clone(),
                        })
                        .collect();
                    println!("{}", Table::new(rows));
                }
                OutputFormat::Pretty => {
                    for m in &overview.models {
                        println!("{}  {}", m.id.cyan(), m.name);
                    }
                }
            }
        }

        Commands::Templates => {
            let overview = api.template_overview().await?;
            for t in &overview.templates {
                println!("{}  {}", t.id.cyan(), t.name);
            }
        }

        Commands::Presets => {
            let overview = api.preset_overview().await?;
            for p in &overview.presets {
                println!("{}  {}", p.id.cyan(), p.name);
            }
        }
    }

    Ok(())
}

fn parse_format(name: &str) -> Option<OutputFormat> {
    match name {
        "pretty" => Some(OutputFormat::Pretty),
        "json" => Some(OutputFormat::Json),
        "table" => Some(OutputFormat::Table),
        _ => None,
    }
}

fn print_session(session: &Session) {
    println!("{}  {}", session.id.to_string().cyan(), session.title.bold());
    println!("prompt: {}", session.prompt);
    for response in &session.responses {
        println!(
            "  {} {:?} ({} messages)",
            response.id, response.status, response.messages.len()
        );
    }
}

/// Run the synchronization core against a live session and narrate what it
/// reports until interrupted.
async fn watch(
    api: Arc<NativeApiClient>,
    connector: WsChangeConnector,
    id: SessionId,
) -> Result<()> {
    let mut controller = SessionController::new(api, connector);
    let session = controller.open(id).await?;
    println!(
        "{} {} ({} responses)",
        "watching".green().bold(),
        session.title,
        session.responses.len()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.close();
                println!("\nstopped");
                break;
            }
            event = controller.next_event() => {
                let Some(event) = event else { break };
                match event {
                    ControllerEvent::Updated(session) => {
                        let active = session
                            .responses
                            .iter()
                            .filter(|r| r.status.is_active())
                            .count();
                        println!(
                            "{} {} responses, {} active",
                            "updated".cyan(),
                            session.responses.len(),
                            active
                        );
                    }
                    ControllerEvent::Connection(state) => {
                        let label = state.to_string();
                        let badge = match state {
                            ConnectionState::Connected => label.green(),
                            ConnectionState::Idle => label.normal(),
                            _ => label.yellow(),
                        };
                        println!("{} {}", "connection:".dimmed(), badge);
                    }
                    ControllerEvent::SessionGone => {
                        println!("{}", "session was deleted on the server".red());
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
