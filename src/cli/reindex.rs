//! `memo reindex` — repair the full-text index.

use anyhow::Result;

use crate::config::MemoConfig;

pub fn reindex(config: &MemoConfig) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut store = super::open_project_store(config, &cwd)?;

    let outcome = store.reindex_fulltext()?;
    println!(
        "full-text index repaired: {} row(s) added, {} orphan(s) removed",
        outcome.added, outcome.removed
    );

    store.close()?;
    Ok(())
}
