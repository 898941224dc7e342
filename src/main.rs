use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod error;
mod extract;
mod mail;
mod query;
mod rate_limit;
mod reviews;
mod seed;
mod state;
mod store;
mod tours;
mod users;

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "natours", version, about = "Tour booking API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Load dev-data tours into the store
    Import {
        #[arg(long, default_value = seed::DEFAULT_TOURS_FILE)]
        file: PathBuf,
    },
    /// Remove all tours, users and reviews
    Delete,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "natours=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app::serve(state).await?,
        Command::Import { file } => {
            let n = seed::import(&state, &file).await?;
            tracing::info!(tours = n, "data successfully loaded");
        }
        Command::Delete => {
            let n = seed::delete(&state).await?;
            tracing::info!(documents = n, "data successfully deleted");
        }
    }

    Ok(())
}
