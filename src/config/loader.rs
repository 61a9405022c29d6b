//! Configuration loading and environment variable interpolation

use crate::error::{Error, Result};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::Config;

pub const CONFIG_FILENAME: &str = "fruitstand.toml";

/// Load configuration from fruitstand.toml
pub fn load_config() -> Result<Config> {
    let config_path = find_config_file()?;
    load_config_from_path(&config_path)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|_| Error::ConfigNotFound)?;
    let content = interpolate_env_vars(&content);
    let config: Config = toml::from_str(&content)?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Find the configuration file, searching upward from current directory
fn find_config_file() -> Result<PathBuf> {
    let mut current = env::current_dir().map_err(|e| Error::Config(e.to_string()))?;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(Error::ConfigNotFound);
        }
    }
}

/// Interpolate environment variables in the format ${VAR_NAME} or ${VAR_NAME:-default}
fn interpolate_env_vars(content: &str) -> String {
    // Compile-time constant pattern; a failure here is a bug, not a runtime condition
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("Invalid regex pattern - this is a bug in the codebase");

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Generate a default configuration file content
pub fn default_config_content() -> &'static str {
    r#"# Fruitstand Configuration

[server]
host = "0.0.0.0"
port = 3000
environment = "${FRUITSTAND_ENV:-development}"
# Proxy addresses whose X-Forwarded-For header is believed
trusted_proxies = []

[database]
url = "${DATABASE_URL:-host=localhost port=5432 user=postgres password=postgres dbname=fruitstand}"
# Keep users, sessions and fruits in memory (nothing survives a restart)
in_memory = false

[auth]
access_token_secret = "${ACCESS_TOKEN_SECRET:-}"
reset_token_secret = "${RESET_TOKEN_SECRET:-}"
access_token_ttl_minutes = 15
bcrypt_cost = 12
issuer = "fruitstand-api"
audience = "fruitstand-client"

[cors]
# Empty list allows any origin but without credentials; list the web
# client's origin so it can send the refresh cookie cross-site
allowed_origins = []

[rate_limit]
enabled = true
auth_max_requests = 20
auth_window_secs = 900
"#
}
