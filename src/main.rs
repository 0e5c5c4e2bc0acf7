use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meet_recorder::{
    create_router, AppState, CollaboratorFactory, Config, MeetingResult, MeetingSession,
    SystemCollaborators,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meet-recorder", version, about = "Attend, record and transcribe online meetings")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/meet-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Attend one meeting and print its transcript when it ends
    Join {
        /// Display name the bot joins with
        #[arg(long)]
        name: String,

        /// Meeting address
        #[arg(long)]
        url: String,

        #[arg(long)]
        language: Option<String>,

        /// Summarization credential
        #[arg(long)]
        api_key: Option<String>,

        /// Show the browser window
        #[arg(long)]
        debug: bool,

        /// Do not record audio/video
        #[arg(long)]
        no_record: bool,

        #[arg(long)]
        output_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Join {
            name,
            url,
            language,
            api_key,
            debug,
            no_record,
            output_dir,
        } => {
            let mut session_config = cfg.session(name, url);
            if let Some(language) = language {
                session_config.language = language;
            }
            if let Some(output_dir) = output_dir {
                session_config.recording_location = output_dir;
            }
            session_config.api_key = api_key;
            session_config.debug = debug;
            session_config.record_meeting = !no_record;

            let collaborators = SystemCollaborators::new(&cfg);
            let session = MeetingSession::new(session_config, collaborators.create())?;

            match attend(session).await? {
                Some(result) => print_result(&result),
                None => warn!("Session stopped before joining the meeting"),
            }
            Ok(())
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(Arc::new(SystemCollaborators::new(&cfg)), cfg);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Shutting down, stopping live and joining sessions");
    let sessions: Vec<MeetingSession> = state.sessions.read().await.values().cloned().collect();
    for session in sessions {
        session.abort().await;
    }

    Ok(())
}

/// Join and wait for the end of the meeting; Ctrl-C stops the session
async fn attend(session: MeetingSession) -> Result<Option<MeetingResult>> {
    let joining = session.clone();
    let mut join_task = tokio::spawn(async move { joining.start().await });
    let mut joined = false;

    loop {
        tokio::select! {
            outcome = &mut join_task, if !joined => {
                joined = true;
                outcome.context("join task failed")??;
            }
            result = session.wait_for_end() => return Ok(result),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping session");
                let result = session.abort().await.or_else(|| session.result());
                if !joined {
                    // The pending join gives up once the session is aborted
                    if let Ok(Err(e)) = join_task.await {
                        info!("Join ended: {}", e);
                    }
                }
                return Ok(result);
            }
        }
    }
}

fn print_result(result: &MeetingResult) {
    println!("Meeting: {} ({})", result.title, result.meeting_url);
    println!("Ended: {:?}", result.stop_reason);
    if let Some(location) = &result.recording_location {
        println!("Recording: {}", location.display());
    }
    println!("\n{}", result.transcript_text);
    if let Some(summary) = &result.summary {
        println!("\nSummary:\n{}", summary);
    }
}
