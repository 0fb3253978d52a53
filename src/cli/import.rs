//! `memo import` — markdown trees and repo-map files.

use std::path::Path;

use anyhow::Result;

use crate::config::MemoConfig;
use crate::identity::Provenance;
use crate::import::{import_markdown, import_repo_map};

pub async fn markdown(
    config: &MemoConfig,
    path: &Path,
    container: Option<&str>,
    chunk_tokens: usize,
    overlap_tokens: usize,
) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let container_tag = super::resolve_container(container, &cwd)?;
    let mut store = super::open_project_store(config, &cwd)?;
    let embedder = crate::embedding::Embedder::lazy(config);
    let provenance = Provenance::collect(&cwd);

    let outcome = import_markdown(
        &mut store,
        &embedder,
        &container_tag,
        &provenance,
        path,
        chunk_tokens,
        overlap_tokens,
    )
    .await?;

    println!(
        "imported {} source(s) into {container_tag}: {} chunk(s) written, {} replaced",
        outcome.sources, outcome.inserted, outcome.deleted
    );

    store.close()?;
    Ok(())
}

pub async fn repo_map(config: &MemoConfig, path: &Path, container: Option<&str>) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let container_tag = super::resolve_container(container, &cwd)?;
    let mut store = super::open_project_store(config, &cwd)?;
    let embedder = crate::embedding::Embedder::lazy(config);
    let provenance = Provenance::collect(&cwd);

    let outcome =
        import_repo_map(&mut store, &embedder, &container_tag, &provenance, path).await?;

    println!(
        "imported repo map into {container_tag}: {} record(s) written, {} replaced",
        outcome.inserted, outcome.deleted
    );

    store.close()?;
    Ok(())
}
