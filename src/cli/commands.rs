//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Password};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::io::BufReader;
use std::path::Path;

use crate::auth::models::{ClientInfo, RegisterRequest};
use crate::auth::{SessionService, UserInfo, UserRole};
use crate::cli::{error, info, print_login_logs, print_users_table, success, warn, OutputFormat};
use crate::config::{self, Config};
use crate::error::Error;
use crate::fruits::seed::parse_csv;
use crate::store::{Backend, CredentialStore, FruitStore, PgStore};

/// Initialize a new fruitstand.toml configuration file
pub async fn init() -> Result<()> {
    let config_path = Path::new(config::loader::CONFIG_FILENAME);

    if config_path.exists() {
        warn("fruitstand.toml already exists");
        return Ok(());
    }

    let content = config::loader::default_config_content();
    fs::write(config_path, content)?;

    success("Created fruitstand.toml");
    info("Set ACCESS_TOKEN_SECRET and run 'fruitstand migrate' to create the tables");

    Ok(())
}

/// Start the HTTP API server
pub async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = load_config()?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info(&format!("Starting server at http://{}:{}", host, port));

    crate::api::run_server(config, &host, port).await?;
    Ok(())
}

/// Create the database tables
pub async fn migrate() -> Result<()> {
    let config = load_config()?;
    if config.database.in_memory {
        warn("database.in_memory is set; nothing to migrate");
        return Ok(());
    }

    let store = PgStore::connect(&config.database.url).await?;
    store.migrate().await?;
    success("Database schema is up to date");
    Ok(())
}

/// Load fruits from a CSV file, skipping names that already exist
pub async fn seed(path: &Path) -> Result<()> {
    let config = load_config()?;
    let file = fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let fruits = parse_csv(BufReader::new(file))?;

    let backend = open_backend(&config).await?;

    let pb = ProgressBar::new(fruits.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut created = 0;
    let mut skipped = 0;
    for fruit in fruits {
        pb.set_message(fruit.name.clone());
        match backend.fruits.create_fruit(fruit).await {
            Ok(_) => created += 1,
            Err(Error::Conflict(_)) => skipped += 1,
            Err(e) => {
                pb.abandon();
                return Err(e.into());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    success(&format!("Seeded {} fruits", created));
    if skipped > 0 {
        info(&format!("Skipped {} fruits that already exist", skipped));
    }
    Ok(())
}

/// Create a user account with an explicit role
pub async fn create_user(
    username: &str,
    email: &str,
    role: UserRole,
    password: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let password = match password {
        Some(password) => password,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };

    let backend = open_backend(&config).await?;
    let sessions = SessionService::from_settings(backend.credentials, &config.auth)?;

    let request = RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password,
    };
    let client = ClientInfo::new("cli", "fruitstand-cli");

    match sessions.create_account(request, role, &client).await {
        Ok(user) => {
            success(&format!("Created {} '{}' (id {})", user.role, user.username, user.id));
            Ok(())
        }
        Err(Error::WeakPassword(violations)) => {
            error("Password does not meet strength requirements:");
            for violation in &violations {
                println!("  - {}", violation);
            }
            Err(Error::WeakPassword(violations).into())
        }
        Err(e) => {
            error(&format!("Failed to create user: {}", e));
            Err(e.into())
        }
    }
}

/// List user accounts
pub async fn users(format: OutputFormat) -> Result<()> {
    let config = load_config()?;
    let backend = open_backend(&config).await?;

    let users: Vec<UserInfo> = backend
        .credentials
        .list_users()
        .await?
        .into_iter()
        .map(UserInfo::from)
        .collect();

    match format {
        OutputFormat::Table => print_users_table(&users),
        other => print_structured(&users, other)?,
    }
    Ok(())
}

/// Activate or deactivate an account
pub async fn set_active(email: &str, active: bool) -> Result<()> {
    let config = load_config()?;
    let backend = open_backend(&config).await?;
    let user = find_user(backend.credentials.as_ref(), email).await?;

    backend.credentials.set_user_active(user.id, active).await?;
    let state = if active { "activated" } else { "deactivated" };
    success(&format!("{} {}", state, user.email));
    Ok(())
}

/// Change an account's role
pub async fn set_role(email: &str, role: UserRole) -> Result<()> {
    let config = load_config()?;
    let backend = open_backend(&config).await?;
    let user = find_user(backend.credentials.as_ref(), email).await?;

    backend.credentials.set_user_role(user.id, role).await?;
    success(&format!("{} is now {}", user.email, role));
    Ok(())
}

/// Show recent login attempts
pub async fn audit(limit: i64, format: OutputFormat) -> Result<()> {
    let config = load_config()?;
    let backend = open_backend(&config).await?;
    let logs = backend.credentials.recent_login_logs(limit).await?;

    match format {
        OutputFormat::Table => print_login_logs(&logs),
        other => print_structured(&logs, other)?,
    }
    Ok(())
}

// Helper functions

fn load_config() -> Result<Config> {
    config::load_config().map_err(|e| anyhow::anyhow!("{}", e))
}

async fn open_backend(config: &Config) -> Result<Backend> {
    if config.database.in_memory {
        warn("database.in_memory is set; changes will not persist");
    }
    Backend::from_config(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}

async fn find_user(store: &dyn CredentialStore, email: &str) -> Result<crate::auth::User> {
    store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No user with email {}", email))
}

fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Table => {}
    }
    Ok(())
}
