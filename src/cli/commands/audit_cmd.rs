//! `filevault audit`: display the audit log.
//!
//! Usage:
//!   filevault audit               # show last 50 entries
//!   filevault audit --last 20     # show last 20
//!   filevault audit --since 7d    # entries from last 7 days

use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::audit::{AuditEntry, AuditLog};
use crate::cli::output;
use crate::cli::{load_settings, Cli};
use crate::errors::{FileVaultError, Result};

/// Execute the `audit` command.
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    let (cwd, settings) = load_settings(cli)?;
    let data_dir = settings.data_path(&cwd);

    let audit = AuditLog::open(&data_dir)
        .ok_or_else(|| FileVaultError::AuditError("failed to open audit database".into()))?;

    let since = since.map(parse_since).transpose()?;
    let entries = audit.query(last, since)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);
    Ok(())
}

/// Parse a human-friendly look-back like "7d", "24h", "30m" into the
/// instant that far in the past.
fn parse_since(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let invalid = || {
        FileVaultError::CommandFailed(format!(
            "invalid duration '{input}': use a form like 7d, 24h, or 30m"
        ))
    };

    let (split, _) = input.char_indices().last().ok_or_else(invalid)?;
    let (num, unit) = input.split_at(split);
    let num: i64 = num.parse().map_err(|_| invalid())?;

    let duration = match unit {
        "d" => chrono::Duration::days(num),
        "h" => chrono::Duration::hours(num),
        "m" => chrono::Duration::minutes(num),
        _ => return Err(invalid()),
    };

    Ok(Utc::now() - duration)
}

fn print_audit_table(entries: &[AuditEntry]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Operation", "User", "File", "Details"]);

    for entry in entries {
        table.add_row(vec![
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            colorize_operation(&entry.operation),
            entry.user_id.clone().unwrap_or_else(|| "(public)".into()),
            entry.file_id.clone().unwrap_or_else(|| "-".into()),
            entry.details.clone().unwrap_or_else(|| "-".into()),
        ]);
    }

    println!("{}", style(format!("{} audit entries:", entries.len())).bold());
    println!("{table}");
}

fn colorize_operation(op: &str) -> String {
    match op {
        "init" | "register" => style(op).green().to_string(),
        "upload" => style(op).blue().to_string(),
        "delete" => style(op).red().to_string(),
        "publish" | "unpublish" => style(op).yellow().to_string(),
        "fetch" => style(op).cyan().to_string(),
        _ => op.to_string(),
    }
}
