//! CLI output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::auth::models::LoginLog;
use crate::auth::{UserInfo, UserRole};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn warn(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

fn header(columns: &[&str]) -> Vec<Cell> {
    columns
        .iter()
        .map(|name| Cell::new(name).fg(Color::Cyan))
        .collect()
}

/// Print a table of user accounts
pub fn print_users_table(users: &[UserInfo]) {
    if users.is_empty() {
        info("No users found. Create one with 'fruitstand create-user'");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&[
            "ID",
            "Username",
            "Email",
            "Role",
            "Active",
            "Last login",
            "Created",
        ]));

    for user in users {
        let role_color = match user.role {
            UserRole::Admin => Color::Magenta,
            UserRole::User => Color::White,
        };
        let (active, active_color) = if user.is_active {
            ("yes", Color::Green)
        } else {
            ("no", Color::Red)
        };
        let last_login = user
            .last_login_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        table.add_row(vec![
            Cell::new(user.id),
            Cell::new(&user.username),
            Cell::new(&user.email),
            Cell::new(user.role).fg(role_color),
            Cell::new(active).fg(active_color),
            Cell::new(last_login),
            Cell::new(user.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    println!("{table}");
}

/// Print recent login attempts, newest first
pub fn print_login_logs(logs: &[LoginLog]) {
    if logs.is_empty() {
        info("No login attempts recorded");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Time", "Email", "IP", "Result", "Reason"]));

    for log in logs {
        let (result, color) = if log.success {
            ("ok", Color::Green)
        } else {
            ("failed", Color::Red)
        };

        table.add_row(vec![
            Cell::new(log.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&log.email),
            Cell::new(&log.ip_address),
            Cell::new(result).fg(color),
            Cell::new(&log.reason),
        ]);
    }

    println!("{table}");
}
