//! `memo reset` — delete the project database after confirmation.

use std::io::Write;

use anyhow::{bail, Result};

use crate::identity;

pub fn reset() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let db_path = identity::database_path(&cwd);

    if !db_path.exists() {
        println!("No database at {}; nothing to reset.", db_path.display());
        return Ok(());
    }

    println!("WARNING: this permanently deletes every memory for this project.");
    println!("Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    crate::db::remove_database(&db_path)?;
    println!("Database removed. It will be re-created on the next write.");
    Ok(())
}
