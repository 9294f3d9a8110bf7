//! Git integration utilities.

use std::path::{Path, PathBuf};

/// Lightweight wrapper around [`gix::Repository`] discovery for workspace detection.
#[derive(Default)]
pub struct GitClient {
    repo: Option<gix::Repository>,
}

impl GitClient {
    /// Attempt to locate a git repository starting from `path`.
    pub fn discover(path: impl AsRef<Path>) -> Self {
        let repo = gix::discover(path).ok();
        Self { repo }
    }

    /// Root of the repository's worktree, if discovery succeeded and it has one.
    pub fn worktree_root(&self) -> Option<PathBuf> {
        let repo = self.repo.as_ref()?;
        repo.work_dir().map(Path::to_path_buf)
    }
}

/// Workspace root for `start`: the enclosing git worktree, or `start` itself.
pub fn workspace_root(start: &Path) -> PathBuf {
    GitClient::discover(start)
        .worktree_root()
        .unwrap_or_else(|| start.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_start_outside_a_repository() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = temp.path().join("plain");
        std::fs::create_dir_all(&dir).expect("create dir");

        assert_eq!(workspace_root(&dir), dir);
    }
}
