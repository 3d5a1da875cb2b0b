//! dotfile: version control for single dotfiles.
//!
//! # Usage
//!
//! ```bash
//! # Start tracking a file
//! dotfile init ~/.bashrc
//!
//! # Record and inspect changes
//! dotfile diff bashrc
//! dotfile commit bashrc -m "add aliases"
//! dotfile log bashrc
//! dotfile checkout bashrc 3f2a9c1
//!
//! # Sync with a dotfile server
//! dotfile config remote http://localhost:8080
//! dotfile push bashrc
//! dotfile pull --all
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotfile_cli::commands::{self, describe};
use dotfile_cli::config;
use dotfile_cli::Env;
use std::path::PathBuf;
use std::process::exit;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dotfile")]
#[command(version = "0.1.0")]
#[command(about = "Version control for dotfiles")]
struct Cli {
    /// Directory holding local commit chains
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Home directory used for `~` paths
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start tracking a file
    Init {
        path: PathBuf,
        /// Alias (default: file name without leading dot or extension)
        alias: Option<String>,
    },

    /// Open a tracked file in $EDITOR
    Edit { alias: String },

    /// Show changes between commits or against the working copy
    Diff {
        alias: String,
        /// Base commit (default: checked out commit)
        from: Option<String>,
        /// Target commit (default: working copy)
        to: Option<String>,
    },

    /// List commits
    Log { alias: String },

    /// Check out a commit, or restore the working copy
    Checkout {
        alias: String,
        hash: Option<String>,
    },

    /// Commit the working copy
    Commit {
        alias: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Push commits to the remote
    Push {
        /// Alias to push (default: every tracked file)
        alias: Option<String>,
    },

    /// Pull commits from the remote
    Pull {
        alias: Option<String>,
        /// Pull every file of the remote user
        #[arg(short, long)]
        all: bool,
        /// Pull from another user's files
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Show or set configuration
    Config {
        /// remote, username or token
        key: Option<String>,
        value: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("error: {:#}", e);
        exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let env = Env {
        storage_dir: match cli.storage_dir {
            Some(dir) => dir,
            None => config::default_storage_dir()?,
        },
        home: match cli.home {
            Some(home) => home,
            None => config::home_dir()?,
        },
        config_path: match cli.config {
            Some(path) => path,
            None => config::default_config_path()?,
        },
    };

    match cli.command {
        Commands::Init { path, alias } => {
            let alias = commands::init(&env, &path, alias.as_deref())?;
            println!("tracking {} as {}", path.display(), alias);
        }
        Commands::Edit { alias } => commands::edit(&env, &alias)?,
        Commands::Diff { alias, from, to } => {
            let diff = commands::diff(&env, &alias, from.as_deref(), to.as_deref())?;
            print!("{}", diff);
        }
        Commands::Log { alias } => println!("{}", commands::log(&env, &alias)?),
        Commands::Checkout { alias, hash } => {
            commands::checkout(&env, &alias, hash.as_deref())?;
        }
        Commands::Commit { alias, message } => {
            commands::commit(&env, &alias, &message)?;
        }
        Commands::Push { alias } => {
            for report in commands::push(&env, alias.as_deref()).await? {
                println!("{}", describe(&report));
            }
        }
        Commands::Pull { alias, all, username } => {
            let reports = commands::pull(&env, alias.as_deref(), all, username.as_deref()).await?;
            for report in reports {
                println!("{}", describe(&report));
            }
        }
        Commands::Config { key, value } => {
            if let Some(shown) = commands::config(&env, key.as_deref(), value.as_deref())? {
                println!("{}", shown);
            }
        }
    }
    Ok(())
}
