//! `repolens`: ask questions about a code repository.
//!
//! ```bash
//! repolens --config config/default.toml index ./my-repo
//! repolens chat ./my-repo --session alice
//! repolens ask ./my-repo "Where is the retry policy configured?"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use repolens_core::bootstrap::resolve_config_path;
use repolens_core::{Answer, Config, RepoLens, SessionId};
use repolens_index::{format_sources, prefer_definition};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "repolens", version, about = "Ask questions about a code repository")]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Falls back to `REPOLENS_CONFIG`, then `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store every supported file under a repository.
    Index { repo: PathBuf },
    /// Interactive question answering with conversational memory.
    Chat {
        repo: PathBuf,
        #[arg(long, default_value = "default")]
        session: String,
        /// Assume the repository is already indexed in the configured store.
        #[arg(long)]
        skip_index: bool,
    },
    /// Answer a single question and exit.
    Ask {
        repo: PathBuf,
        question: String,
        #[arg(long)]
        skip_index: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let lens = Arc::new(RepoLens::from_config(config)?);

    match cli.command {
        Command::Index { repo } => index(&lens, &repo).await,
        Command::Ask {
            repo,
            question,
            skip_index,
        } => {
            if !skip_index {
                index(&lens, &repo).await?;
            }
            let answer = lens.ask(&SessionId::from("oneshot"), &question).await?;
            print_answer(&question, &answer);
            Ok(())
        }
        Command::Chat {
            repo,
            session,
            skip_index,
        } => {
            if !skip_index {
                index(&lens, &repo).await?;
            }
            chat(lens, SessionId::new(session)).await
        }
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn index(lens: &RepoLens<repolens_llm::AnyProvider>, repo: &Path) -> anyhow::Result<()> {
    let report = lens.index_repository(repo).await?;
    println!("Indexed {report}");
    if report.chunks_stale > 0 {
        println!(
            "{} indexed chunks no longer exist in the repository; recreate the collection to drop them.",
            report.chunks_stale
        );
    }
    Ok(())
}

async fn chat(lens: Arc<RepoLens<repolens_llm::AnyProvider>>, session: SessionId) -> anyhow::Result<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let sweeper = {
        let sessions = Arc::clone(lens.sessions());
        let period = lens.config().idle_ttl().max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                sessions.evict_idle();
            }
        })
    };

    println!("Session `{session}`. Type /clear to forget the conversation, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = shutdown_rx.changed() => None,
        };
        let Some(line) = line else { break };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                lens.clear_session(&session);
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let result = tokio::select! {
            result = lens.ask(&session, question) => result,
            _ = shutdown_rx.changed() => break,
        };
        match result {
            Ok(answer) => print_answer(question, &answer),
            Err(e) => eprintln!("error: {e:#}"),
        }
    }

    sweeper.abort();
    Ok(())
}

fn print_answer(question: &str, answer: &Answer) {
    println!("{}", answer.text);
    if answer.no_context {
        println!("\n(No relevant code found in the index.)");
    } else {
        let mut sources = answer.sources.clone();
        prefer_definition(question, &mut sources);
        println!("\nSources:\n{}", format_sources(&sources));
    }
}
