//! `memo status` — model, store, and threshold summary.

use anyhow::Result;

use crate::config::MemoConfig;
use crate::db::schema;

pub fn status(config: &MemoConfig) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let store = super::open_project_store(config, &cwd)?;

    println!("model:      {}", config.embedding_model);
    if let Some(recorded) = schema::get_model_id(store.conn())? {
        if recorded != config.embedding_model {
            println!("            (store was written with {recorded})");
        }
    }
    println!("dimensions: {}", config.embedding_dimensions);
    if let Some(path) = store.path() {
        println!("database:   {} ({} bytes)", path.display(), store.file_size());
    }
    println!(
        "thresholds: similarity {} / vector gate {} / dedup {}",
        config.similarity_threshold,
        config.min_vector_similarity,
        config.deduplication_similarity_threshold
    );

    let counts = store.count_by_container()?;
    if counts.is_empty() {
        println!("memories:   none");
    } else {
        println!("memories:   {} total", store.count(None)?);
        for (container, count) in counts {
            println!("  {container}: {count}");
        }
    }

    store.close()?;
    Ok(())
}
