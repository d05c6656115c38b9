use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod hindilinks;
mod http;
mod models;
mod resolver;
mod servers;
mod toonstream;
mod utils;

use api::{AppState, build_router};
use config::Settings;
use http::HttpFetcher;
use models::Language;

#[derive(Parser)]
#[command(name = "media-scraper", version, about = "Movie, series and anime scraper with embed resolution")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Address the API listens on
    #[arg(long, env = "SCRAPER_BIND", default_value = "0.0.0.0:8000", global = true)]
    bind: SocketAddr,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Run the JSON API (default)
    Serve,

    /// Resolve one embed URL to a direct media link
    Resolve {
        url: String,

        /// Maximum hops to follow
        #[arg(short, long, default_value_t = 3)]
        depth: u32,
    },

    /// Search either site and print the results as JSON
    Search {
        term: String,

        /// Search the anime site instead of the movie site
        #[arg(long)]
        anime: bool,

        /// Only keep movies in this language
        #[arg(short, long)]
        language: Option<Language>,

        /// Result pages to walk
        #[arg(long, default_value_t = 3)]
        max_pages: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env_file()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let fetcher = HttpFetcher::new(cli.settings.fetch_options()).context("failed to build HTTP client")?;
    let state = AppState::new(Arc::new(fetcher), &cli.settings);

    match cli.command {
        None | Some(Command::Serve) => serve(state, cli.bind).await,
        Some(Command::Resolve { url, depth }) => {
            let direct = state
                .resolver
                .resolve(&url, depth)
                .await
                .ok_or_else(|| anyhow!("could not resolve {} within {} hops", url, depth))?;
            println!("{}", direct);
            Ok(())
        }
        Some(Command::Search {
            term,
            anime,
            language,
            max_pages,
        }) => {
            let term = utils::sanitize_term(&term);
            if term.is_empty() {
                bail!("search term cannot be empty");
            }
            let json = if anime {
                serde_json::to_string_pretty(&state.toonstream.search_anime(&term).await?)?
            } else {
                serde_json::to_string_pretty(&state.hindilinks.search_movies(&term, language, max_pages).await?)?
            };
            println!("{}", json);
            Ok(())
        }
    }
}

async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to listen for ctrl+c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => tracing::warn!(%error, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
