//! `memo forget` — delete a record by id, with an optional container guard.

use anyhow::Result;

use crate::config::MemoConfig;
use crate::error::MemoError;
use crate::identity;

pub fn forget(config: &MemoConfig, id: &str, container: Option<&str>) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut store = super::open_project_store(config, &cwd)?;

    let actual = store
        .get_container_tag(id)?
        .ok_or_else(|| MemoError::NotFound(format!("memory {id}")))?;

    if let Some(name) = container {
        let requested = identity::named_container_tag(name).ok_or_else(|| {
            MemoError::InvalidInput(format!(
                "container name {name:?} contains no usable characters"
            ))
        })?;
        if requested != actual {
            return Err(MemoError::WrongContainer {
                id: id.to_string(),
                actual,
                requested,
            }
            .into());
        }
    }

    store.delete(id)?;
    println!("forgot {id}");

    store.close()?;
    Ok(())
}
