//! Importers — markdown trees and repo-map files.
//!
//! Each import source resolves to a stable *source key* (the canonical file
//! path, or `repo-map:<path>`), and every run hands the complete new record
//! set to [`Store::replace_by_source`]. Re-importing a source is therefore a
//! full-snapshot replacement, never an append.

pub mod chunker;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::embedding::Embedder;
use crate::error::MemoError;
use crate::identity::Provenance;
use crate::memory::store::Store;
use crate::memory::types::{
    ChunkMetadata, MemoryRecord, RepoMapMetadata, DOC_CHUNK_TYPE,
};

/// Extensions accepted by the markdown importer.
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdx"];

/// Aggregate counts over one import command.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOutcome {
    pub sources: usize,
    pub inserted: usize,
    pub deleted: usize,
}

/// Import a markdown file or directory tree into `container_tag`.
///
/// Directories are walked recursively in filename order; symlinks inside a
/// tree are skipped, a symlink given directly is rejected.
pub async fn import_markdown(
    store: &mut Store,
    embedder: &Embedder,
    container_tag: &str,
    provenance: &Provenance,
    path: &Path,
    chunk_tokens: usize,
    overlap_tokens: usize,
) -> Result<ImportOutcome> {
    let meta = std::fs::symlink_metadata(path)
        .map_err(|_| MemoError::NotFound(format!("import path {}", path.display())))?;

    if meta.file_type().is_symlink() {
        return Err(MemoError::InvalidInput(format!(
            "refusing to import symlink {}",
            path.display()
        ))
        .into());
    }

    let files = if meta.is_dir() {
        collect_markdown_files(path)?
    } else {
        if !has_markdown_extension(path) {
            return Err(MemoError::InvalidInput(format!(
                "unsupported extension on {}; expected .md, .markdown, or .mdx",
                path.display()
            ))
            .into());
        }
        vec![path.to_path_buf()]
    };

    let (max_chars, overlap_chars) = chunker::window_chars(chunk_tokens, overlap_tokens);

    let mut outcome = ImportOutcome::default();
    for file in files {
        let source_key = source_key_for(&file)?;
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;

        let chunks = chunker::chunk_text(&text, max_chars, overlap_chars);
        let chunk_count = chunks.len();

        let mut records = Vec::with_capacity(chunk_count);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let vector = embedder.embed(store, &chunk.text).await?;
            let metadata = ChunkMetadata {
                source_path: source_key.clone(),
                source_key: source_key.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                chunk_index: index,
                chunk_count,
                chunk_hash: chunk.hash,
            };
            let mut record =
                MemoryRecord::new(chunk.text, vector, container_tag.to_string());
            record.source_key = Some(source_key.clone());
            record.record_type = Some(DOC_CHUNK_TYPE.to_string());
            record.metadata = Some(serde_json::to_string(&metadata)?);
            record.provenance = provenance.clone();
            records.push(record);
        }

        let replaced = store.replace_by_source(container_tag, &source_key, &mut records)?;
        tracing::info!(
            source = %source_key,
            inserted = replaced.inserted,
            deleted = replaced.deleted,
            "imported markdown source"
        );
        outcome.sources += 1;
        outcome.inserted += replaced.inserted;
        outcome.deleted += replaced.deleted;
    }

    Ok(outcome)
}

/// Import a repo-map JSON file: an array of
/// `{path, language?, symbols?, content?}` entries, one record each.
pub async fn import_repo_map(
    store: &mut Store,
    embedder: &Embedder,
    container_tag: &str,
    provenance: &Provenance,
    path: &Path,
) -> Result<ImportOutcome> {
    let meta = std::fs::symlink_metadata(path)
        .map_err(|_| MemoError::NotFound(format!("import path {}", path.display())))?;
    if meta.file_type().is_symlink() {
        return Err(MemoError::InvalidInput(format!(
            "refusing to import symlink {}",
            path.display()
        ))
        .into());
    }
    if !meta.is_file() {
        return Err(MemoError::InvalidInput(format!(
            "repo-map input {} is not a file",
            path.display()
        ))
        .into());
    }

    let source_key = format!("repo-map:{}", source_key_for(path)?);

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| MemoError::InvalidInput(format!("repo-map is not valid JSON: {e}")))?;
    let entries = parsed
        .as_array()
        .ok_or_else(|| MemoError::InvalidInput("repo-map must be a JSON array".into()))?;

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let entry_path = entry
            .get("path")
            .and_then(|p| p.as_str())
            .ok_or_else(|| {
                MemoError::InvalidInput(format!("repo-map entry {index} is missing \"path\""))
            })?;
        let language = entry
            .get("language")
            .and_then(|l| l.as_str())
            .unwrap_or("unknown");
        let symbols: Vec<String> = entry
            .get("symbols")
            .and_then(|s| s.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let body = entry.get("content").and_then(|c| c.as_str()).unwrap_or("");

        let mut content = format!("{entry_path} [{language}] {}", symbols.join(" "));
        if !body.is_empty() {
            content.push('\n');
            content.push_str(body);
        }

        let vector = embedder.embed(store, &content).await?;
        let metadata = RepoMapMetadata {
            source_path: entry_path.to_string(),
            source_key: source_key.clone(),
            language: language.to_string(),
            symbols,
            import_type: "repo-map".to_string(),
        };
        let mut record = MemoryRecord::new(content, vector, container_tag.to_string());
        record.source_key = Some(source_key.clone());
        record.record_type = Some(DOC_CHUNK_TYPE.to_string());
        record.metadata = Some(serde_json::to_string(&metadata)?);
        record.provenance = provenance.clone();
        records.push(record);
    }

    let replaced = store.replace_by_source(container_tag, &source_key, &mut records)?;
    tracing::info!(
        source = %source_key,
        inserted = replaced.inserted,
        deleted = replaced.deleted,
        "imported repo map"
    );

    Ok(ImportOutcome {
        sources: 1,
        inserted: replaced.inserted,
        deleted: replaced.deleted,
    })
}

/// Canonical path with separators normalised to `/`, the stable source key.
fn source_key_for(path: &Path) -> Result<String> {
    let real = path
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    Ok(real.to_string_lossy().replace('\\', "/"))
}

fn has_markdown_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|m| e.eq_ignore_ascii_case(m))
        })
        .unwrap_or(false)
}

/// All markdown files under `dir`, recursing in filename order. Symlinks are
/// skipped silently.
fn collect_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    let mut files = Vec::new();
    for entry in entries {
        let meta = std::fs::symlink_metadata(&entry)?;
        if meta.file_type().is_symlink() {
            tracing::debug!(path = %entry.display(), "skipping symlink during import walk");
            continue;
        }
        if meta.is_dir() {
            files.extend(collect_markdown_files(&entry)?);
        } else if has_markdown_extension(&entry) {
            files.push(entry);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_extension_check() {
        assert!(has_markdown_extension(Path::new("notes.md")));
        assert!(has_markdown_extension(Path::new("notes.MD")));
        assert!(has_markdown_extension(Path::new("a/b/guide.markdown")));
        assert!(has_markdown_extension(Path::new("page.mdx")));
        assert!(!has_markdown_extension(Path::new("script.rs")));
        assert!(!has_markdown_extension(Path::new("README")));
    }

    #[test]
    fn walk_is_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("sub/c.md"), "c").unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "x").unwrap();

        let files = collect_markdown_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "c.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn walk_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.md"), "real").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.md"), dir.path().join("link.md"))
            .unwrap();

        let files = collect_markdown_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("real.md"));
    }

    #[test]
    fn source_keys_use_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.md");
        std::fs::write(&file, "text").unwrap();
        let key = source_key_for(&file).unwrap();
        assert!(!key.contains('\\'));
        assert!(key.ends_with("doc.md"));
    }
}
