//! CLI interface for Fruitstand

pub mod commands;
mod output;

pub use output::*;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::auth::UserRole;

#[derive(Parser)]
#[command(name = "fruitstand")]
#[command(author = "Krakaw")]
#[command(version)]
#[command(about = "Fruit inventory API with session authentication", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new fruitstand.toml configuration file
    Init,

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create or update the database tables
    Migrate,

    /// Load fruits from a CSV file (name,description,price,quantity)
    Seed {
        /// Path to the CSV file
        path: PathBuf,
    },

    /// Create a user account, prompting for the password
    CreateUser {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long, default_value = "user")]
        role: UserRole,

        /// Password to use instead of prompting
        #[arg(long, env = "FRUITSTAND_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// List user accounts
    Users {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Activate or deactivate an account
    SetActive {
        email: String,

        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },

    /// Change an account's role
    SetRole { email: String, role: UserRole },

    /// Show recent login attempts
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: i64,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}
