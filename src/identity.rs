//! Container tags and project identity.
//!
//! A memory belongs to a *container*: either the current project
//! (`project:<hash>`) or an explicitly named scope (`container:<slug>`).
//! The project hash is derived from the git *common* directory so that all
//! worktrees of one repository share a single container and database, falling
//! back to the working directory outside version control.

use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};

/// Prefix of project-scoped container tags.
pub const PROJECT_PREFIX: &str = "project:";
/// Prefix of named container tags.
pub const NAMED_PREFIX: &str = "container:";

/// Derive the project container tag for a working directory.
///
/// Hashes the worktree-stable identity path (git common dir, else the
/// directory itself) and keeps the first 16 hex chars.
pub fn project_container_tag(cwd: &Path) -> String {
    let identity = project_identity_path(cwd);
    let digest = Sha256::digest(identity.to_string_lossy().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{PROJECT_PREFIX}{}", &hex[..16])
}

/// Build a `container:<slug>` tag from a user-supplied name.
///
/// Returns `None` when the name slugifies to nothing.
pub fn named_container_tag(name: &str) -> Option<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        None
    } else {
        Some(format!("{NAMED_PREFIX}{slug}"))
    }
}

/// Lowercase, collapse every non-`[a-z0-9]` run to a single `-`, trim `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// The directory whose contents define this project: parent of the git
/// common dir when inside a repository, else the working directory itself.
pub fn project_root(cwd: &Path) -> PathBuf {
    match discover_git_common_dir(cwd) {
        Some(common) => common.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf()),
        None => cwd.to_path_buf(),
    }
}

/// Path to the per-project database under the project root.
pub fn database_path(cwd: &Path) -> PathBuf {
    project_root(cwd).join(".memo").join("memo.db")
}

/// The path hashed into the project tag. Canonicalised so equivalent spellings
/// of one directory agree.
fn project_identity_path(cwd: &Path) -> PathBuf {
    let raw = discover_git_common_dir(cwd).unwrap_or_else(|| cwd.to_path_buf());
    raw.canonicalize().unwrap_or(raw)
}

/// Walk up from `start` looking for a `.git` entry, resolving linked
/// worktrees to the shared common directory.
///
/// A `.git` *file* (worktree or submodule) contains `gitdir: <path>`; the
/// referenced directory may in turn hold a `commondir` file pointing at the
/// repository's shared `.git`.
fn discover_git_common_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start.to_path_buf());
    while let Some(d) = dir {
        let dot_git = d.join(".git");
        if dot_git.is_dir() {
            return Some(resolve_commondir(&dot_git));
        }
        if dot_git.is_file() {
            if let Some(gitdir) = read_gitdir_pointer(&dot_git, &d) {
                return Some(resolve_commondir(&gitdir));
            }
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    None
}

/// Parse a `.git` pointer file (`gitdir: ../.git/worktrees/foo`).
fn read_gitdir_pointer(dot_git_file: &Path, base: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string(dot_git_file).ok()?;
    let target = contents.strip_prefix("gitdir:")?.trim();
    let path = PathBuf::from(target);
    if path.is_absolute() {
        Some(path)
    } else {
        Some(base.join(path))
    }
}

/// Follow a `commondir` indirection inside a git dir, if present.
fn resolve_commondir(git_dir: &Path) -> PathBuf {
    let commondir_file = git_dir.join("commondir");
    match std::fs::read_to_string(&commondir_file) {
        Ok(contents) => {
            let target = PathBuf::from(contents.trim());
            let resolved = if target.is_absolute() {
                target
            } else {
                git_dir.join(target)
            };
            resolved.canonicalize().unwrap_or(resolved)
        }
        Err(_) => git_dir.to_path_buf(),
    }
}

/// Provenance attributes stamped onto records at insert. All best-effort.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub display_name: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub project_path: Option<String>,
    pub project_name: Option<String>,
    pub git_repo_url: Option<String>,
}

impl Provenance {
    /// Collect provenance for a working directory. Missing git or config
    /// values simply stay `None`.
    pub fn collect(cwd: &Path) -> Self {
        let root = project_root(cwd);
        let project_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let display_name = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok();

        Self {
            display_name,
            user_name: git_config(&root, "user.name"),
            user_email: git_config(&root, "user.email"),
            project_path: Some(root.to_string_lossy().into_owned()),
            project_name,
            git_repo_url: git_config(&root, "remote.origin.url"),
        }
    }
}

fn git_config(dir: &Path, key: &str) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["config", "--get", key])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("My Project"), "my-project");
        assert_eq!(slugify("docs"), "docs");
        assert_eq!(slugify("API v2.1"), "api-v2-1");
    }

    #[test]
    fn slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("  weird---name!! "), "weird-name");
        assert_eq!(slugify("--x--"), "x");
    }

    #[test]
    fn slugify_is_idempotent() {
        for name in ["Hello World", "a_b_c", "Ü nicode", "x--y"] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn slugify_can_be_empty() {
        assert_eq!(slugify("!!!"), "");
        assert_eq!(named_container_tag("!!!"), None);
    }

    #[test]
    fn named_tag_shape() {
        assert_eq!(
            named_container_tag("My Docs").as_deref(),
            Some("container:my-docs")
        );
    }

    #[test]
    fn project_tag_shape_and_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let tag = project_container_tag(dir.path());
        assert!(tag.starts_with(PROJECT_PREFIX));
        assert_eq!(tag.len(), PROJECT_PREFIX.len() + 16);
        assert!(tag[PROJECT_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
        assert_eq!(tag, project_container_tag(dir.path()));
    }

    #[test]
    fn distinct_directories_get_distinct_tags() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_ne!(
            project_container_tag(a.path()),
            project_container_tag(b.path())
        );
    }

    #[test]
    fn git_dir_defines_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        let nested = repo.join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            project_root(&nested).canonicalize().unwrap(),
            repo.canonicalize().unwrap()
        );
        assert_eq!(
            project_container_tag(&nested),
            project_container_tag(&repo)
        );
    }

    #[test]
    fn worktrees_share_a_tag() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main");
        let main_git = main.join(".git");
        std::fs::create_dir_all(&main_git).unwrap();

        // Simulate `git worktree add`: a linked worktree whose .git file
        // points at <main>/.git/worktrees/wt, which points back via commondir.
        let wt_gitdir = main_git.join("worktrees").join("wt");
        std::fs::create_dir_all(&wt_gitdir).unwrap();
        std::fs::write(wt_gitdir.join("commondir"), "../..\n").unwrap();

        let linked = dir.path().join("linked");
        std::fs::create_dir_all(&linked).unwrap();
        std::fs::write(
            linked.join(".git"),
            format!("gitdir: {}\n", wt_gitdir.display()),
        )
        .unwrap();

        assert_eq!(
            project_container_tag(&main),
            project_container_tag(&linked)
        );
        // Both worktrees resolve to the same project root, hence one database.
        assert_eq!(
            project_root(&main).canonicalize().unwrap(),
            project_root(&linked).canonicalize().unwrap()
        );
    }
}
