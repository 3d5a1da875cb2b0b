//! Dotfile Server
//!
//! Stores users' dotfile commit chains in SQLite and serves them over the
//! `/api/v1` sync API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotfile_core::SqliteStore;
use dotfile_http::{ApiHandler, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Dotfile Server Configuration
#[derive(Parser, Debug)]
#[command(name = "dotfile-server")]
#[command(version = "0.1.0")]
#[command(about = "Sync server for dotfile commit chains", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "./data/dotfile.db")]
    db: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Listen address (e.g., 0.0.0.0:8080)
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Maximum request body size in bytes
        #[arg(long, default_value_t = 10 * 1024 * 1024)]
        max_body_size: usize,
    },

    /// Create a user and print its API token
    AddUser {
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Some(parent) = cli.db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {:?}", parent))?;
    }
    let store = Arc::new(
        SqliteStore::open(&cli.db).with_context(|| format!("opening database {:?}", cli.db))?,
    );

    match cli.command {
        Commands::Start { addr, max_body_size } => {
            info!("Starting dotfile server on {}", addr);
            info!("Database: {:?}", cli.db);

            let handler = Arc::new(ApiHandler::with_config(store, Config { max_body_size }));
            let addr: SocketAddr = addr.parse().context("invalid listen address")?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {}", addr))?;
            info!("Server listening on {}", addr);

            dotfile_http::serve(listener, handler).await?;
        }

        Commands::AddUser { username } => {
            let token = store
                .create_user(&username)
                .with_context(|| format!("creating user {:?}", username))?;
            info!("Created user {}", username);
            println!("{}", token);
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}
