//! `memo list` — recent records, newest first.

use anyhow::Result;
use chrono::TimeZone;

use crate::config::MemoConfig;
use crate::error::MemoError;

pub fn list(
    config: &MemoConfig,
    limit: Option<usize>,
    all: bool,
    container: Option<&str>,
) -> Result<()> {
    if all && limit.is_some() {
        return Err(
            MemoError::InvalidInput("--all and --limit are mutually exclusive".into()).into(),
        );
    }

    let cwd = std::env::current_dir()?;
    let container_tag = super::resolve_container(container, &cwd)?;
    let store = super::open_project_store(config, &cwd)?;

    let limit = if all {
        -1
    } else {
        limit.unwrap_or(config.max_memories) as i64
    };

    let records = store.list(Some(&container_tag), limit)?;

    if records.is_empty() {
        println!("No memories in {container_tag}.");
    } else {
        for record in &records {
            let date = match chrono::Utc.timestamp_millis_opt(record.created_at) {
                chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d").to_string(),
                _ => "unknown".to_string(),
            };
            println!("{} {} {}", record.id, date, preview(&record.content, 100));
        }
        println!("\n{} record(s) in {container_tag}", records.len());
    }

    store.close()?;
    Ok(())
}

/// First line of the content, truncated to `max_chars`.
fn preview(content: &str, max_chars: usize) -> String {
    let first_line = content.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
