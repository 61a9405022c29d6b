use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fruitstand::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fruitstand=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cli::commands::init().await,
        Commands::Serve { host, port } => cli::commands::serve(host, port).await,
        Commands::Migrate => cli::commands::migrate().await,
        Commands::Seed { path } => cli::commands::seed(&path).await,
        Commands::CreateUser {
            username,
            email,
            role,
            password,
        } => cli::commands::create_user(&username, &email, role, password).await,
        Commands::Users { format } => cli::commands::users(format).await,
        Commands::SetActive { email, active } => cli::commands::set_active(&email, active).await,
        Commands::SetRole { email, role } => cli::commands::set_role(&email, role).await,
        Commands::Audit { limit, format } => cli::commands::audit(limit, format).await,
    }
}
