//! Command implementations and shared CLI plumbing.

pub mod add;
pub mod forget;
pub mod import;
pub mod list;
pub mod reindex;
pub mod reset;
pub mod search;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use crate::config::MemoConfig;
use crate::error::MemoError;
use crate::identity;
use crate::memory::store::Store;

/// Resolve the container tag for a command: an explicit `--container` name,
/// or the current project.
pub fn resolve_container(container: Option<&str>, cwd: &Path) -> Result<String> {
    match container {
        Some(name) => identity::named_container_tag(name).ok_or_else(|| {
            MemoError::InvalidInput(format!(
                "container name {name:?} contains no usable characters"
            ))
            .into()
        }),
        None => Ok(identity::project_container_tag(cwd)),
    }
}

/// Open the per-project store for the working directory.
pub fn open_project_store(config: &MemoConfig, cwd: &Path) -> Result<Store> {
    let store = Store::open(identity::database_path(cwd), config.embedding_dimensions)?;
    store.record_model_id(&config.embedding_model)?;
    Ok(store)
}

/// Download the ONNX model and tokenizer for the configured embedding model.
pub async fn model_download(config: &MemoConfig) -> Result<()> {
    let model_dir = config.model_dir();
    std::fs::create_dir_all(&model_dir)
        .with_context(|| format!("failed to create model dir {}", model_dir.display()))?;

    let base = format!(
        "https://huggingface.co/{}/resolve/main",
        config.embedding_model
    );

    for (url, name) in [
        (format!("{base}/onnx/model.onnx"), "model.onnx"),
        (format!("{base}/tokenizer.json"), "tokenizer.json"),
    ] {
        let dest = model_dir.join(name);
        if dest.exists() {
            println!("{name} already exists at {}", dest.display());
            continue;
        }
        println!("Downloading {name}...");
        download_file(&url, &dest).await?;
        println!("{name} saved to {}", dest.display());
    }

    println!("Model download complete.");
    Ok(())
}

/// Download a file with a progress bar. Atomic write (tmp + rename).
async fn download_file(url: &str, dest: &PathBuf) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .expect("valid template")
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file {}", tmp_path.display()))?;

    let bytes = response.bytes().await.context("error reading response")?;
    pb.inc(bytes.len() as u64);
    file.write_all(&bytes).await.context("error writing file")?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
