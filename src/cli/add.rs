//! `memo add` — insert one user memory, guarded by the duplicate check.

use anyhow::Result;

use crate::config::MemoConfig;
use crate::error::MemoError;
use crate::identity::Provenance;
use crate::memory::dedup::{self, DedupVerdict};
use crate::memory::types::MemoryRecord;

pub async fn add(config: &MemoConfig, text: &str, container: Option<&str>) -> Result<()> {
    if text.trim().is_empty() {
        return Err(MemoError::InvalidInput("memory text must not be empty".into()).into());
    }

    let cwd = std::env::current_dir()?;
    let container_tag = super::resolve_container(container, &cwd)?;
    let mut store = super::open_project_store(config, &cwd)?;

    let embedder = crate::embedding::Embedder::lazy(config);
    let vector = embedder.embed(&store, text).await?;

    let verdict = dedup::check(
        &store,
        text,
        &vector,
        &container_tag,
        config.deduplication_enabled,
        config.deduplication_similarity_threshold,
    )?;

    match verdict {
        DedupVerdict::ExactDuplicate { id } => {
            println!("skipped: exact duplicate of {id}, similarity=1.000");
        }
        DedupVerdict::NearDuplicate { id, similarity } => {
            println!("skipped: near duplicate of {id}, similarity={similarity:.3}");
        }
        DedupVerdict::NotDuplicate => {
            let mut record = MemoryRecord::new(text.to_string(), vector, container_tag.clone());
            record.provenance = Provenance::collect(&cwd);
            store.insert(&mut record)?;
            println!("stored {} in {container_tag}", record.id);
        }
    }

    store.close()?;
    Ok(())
}
