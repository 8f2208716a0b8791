//! Ripple CLI
//!
//! Command-line chat client and reference server.
//!
//! # Commands
//!
//! - `serve` - Run the chat server
//! - `chat` - Join a chat server from the terminal
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ripple realtime chat.
#[derive(Parser)]
#[command(name = "ripple")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Database name clients must ask for
        #[arg(short, long, default_value = ripple_server::DEFAULT_DATABASE)]
        database: String,

        /// Secret for signing identity tokens (random if omitted)
        #[arg(short, long)]
        secret: Option<String>,
    },

    /// Join a chat server
    Chat {
        /// Server address
        #[arg(short, long, default_value = ripple_client::DEFAULT_ENDPOINT)]
        server: String,

        /// Database name
        #[arg(short, long, default_value = ripple_client::DEFAULT_DATABASE)]
        database: String,

        /// Directory holding the saved identity token
        #[arg(short, long)]
        credentials_dir: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so chat output on stdout stays clean
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            database,
            secret,
        } => {
            commands::serve::run(bind, &database, secret)?;
        }
        Commands::Chat {
            server,
            database,
            credentials_dir,
        } => {
            commands::chat::run(&server, &database, credentials_dir)?;
        }
        Commands::Version => {
            println!("Ripple CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Protocol v{}", ripple_protocol::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
