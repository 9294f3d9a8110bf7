//! Bookmark sets of every tracked file within one store scope.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::app::navigation::NavigationPolicy;
use crate::domain::errors::BookmarkError;
use crate::domain::model::{BookmarkSet, Slot, ToggleOutcome, WorkspaceFolder};
use crate::infra::persistence::{BookmarkDocument, BookmarkRecord};

/// Workspace boundary a [`Controller`] covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    /// Whole session, persisted in session state.
    Session,
    /// A single workspace folder, persisted inside the project.
    Folder(WorkspaceFolder),
}

impl StoreScope {
    pub fn folder(&self) -> Option<&WorkspaceFolder> {
        match self {
            StoreScope::Session => None,
            StoreScope::Folder(folder) => Some(folder),
        }
    }
}

/// Owns the bookmark sets of one scope, in insertion order.
///
/// Insertion order is the navigation order used by duplicate-aware jumps, so files are never
/// reordered once added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    scope: StoreScope,
    files: Vec<BookmarkSet>,
}

impl Controller {
    pub fn new(scope: StoreScope) -> Self {
        Self {
            scope,
            files: Vec::new(),
        }
    }

    pub fn scope(&self) -> &StoreScope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[BookmarkSet] {
        &self.files
    }

    /// Track `path`, creating an empty set on first sight. Existing sets are left untouched.
    pub fn add_file(
        &mut self,
        path: impl Into<PathBuf>,
        workspace_folder: Option<PathBuf>,
    ) -> &mut BookmarkSet {
        let path = path.into();
        let index = match self.index_of(&path) {
            Some(index) => index,
            None => {
                debug!(path = %path.display(), "tracking file");
                self.files.push(BookmarkSet::new(path, workspace_folder));
                self.files.len() - 1
            }
        };
        &mut self.files[index]
    }

    pub fn lookup(&self, path: &Path) -> Option<&BookmarkSet> {
        self.files.iter().find(|set| same_path(set.path(), path))
    }

    pub fn lookup_mut(&mut self, path: &Path) -> Option<&mut BookmarkSet> {
        self.files.iter_mut().find(|set| same_path(set.path(), path))
    }

    /// Position of `path` in insertion order.
    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|set| same_path(set.path(), path))
    }

    /// Toggle `slot` on `line` of `path` under `policy`.
    ///
    /// With [`NavigationPolicy::Replace`] a slot is unique across the scope, so setting it
    /// clears the same slot in every other file.
    pub fn toggle(
        &mut self,
        path: &Path,
        slot: Slot,
        line: usize,
        policy: NavigationPolicy,
    ) -> ToggleOutcome {
        let outcome = self.add_file(path, None).toggle(slot, line);

        if policy == NavigationPolicy::Replace && matches!(outcome, ToggleOutcome::Set { .. }) {
            let mut invalidated = 0;
            for other in self
                .files
                .iter_mut()
                .filter(|set| !same_path(set.path(), path))
            {
                if other.clear(slot) {
                    invalidated += 1;
                }
            }
            if invalidated > 0 {
                debug!(%slot, invalidated, "replaced slot in other files");
            }
        }

        outcome
    }

    /// Store an updated set for an already tracked file. Returns whether any slot changed.
    pub fn update(&mut self, updated: BookmarkSet) -> bool {
        match self.lookup_mut(updated.path()) {
            Some(existing) if existing.slots() != updated.slots() => {
                *existing = updated;
                true
            }
            Some(_) => false,
            None => {
                let changed = !updated.is_empty();
                self.files.push(updated);
                changed
            }
        }
    }

    pub fn clear_slot(&mut self, path: &Path, slot: Slot) -> bool {
        self.lookup_mut(path).is_some_and(|set| set.clear(slot))
    }

    pub fn clear_all_in(&mut self, path: &Path) -> bool {
        self.lookup_mut(path).is_some_and(BookmarkSet::clear_all)
    }

    pub fn clear_all_files(&mut self) -> bool {
        self.files
            .iter_mut()
            .fold(false, |changed, set| set.clear_all() || changed)
    }

    /// Stop tracking `path`, handing back its set.
    pub fn remove_file(&mut self, path: &Path) -> Option<BookmarkSet> {
        let index = self.index_of(path)?;
        Some(self.files.remove(index))
    }

    /// Record every set the way the persisted document stores it, empty sets included.
    pub fn serialize(&self) -> BookmarkDocument {
        BookmarkDocument::new(self.files.iter().map(BookmarkRecord::from).collect())
    }

    /// Load sets from a persisted document.
    ///
    /// Without `merge` the current sets are replaced; with it, records overwrite matching files
    /// and new files are appended. A record that fails validation aborts the whole load and
    /// leaves the controller untouched.
    pub fn deserialize(
        &mut self,
        document: &BookmarkDocument,
        merge: bool,
    ) -> Result<(), BookmarkError> {
        let mut files = if merge {
            self.files.clone()
        } else {
            Vec::new()
        };
        let folder = self.scope.folder().map(|folder| folder.root.clone());

        for record in document.records() {
            let slots = record.slots()?;
            let path = PathBuf::from(&record.path);
            match files.iter_mut().find(|set| same_path(set.path(), &path)) {
                Some(existing) => {
                    let owner = existing.workspace_folder().map(ToOwned::to_owned);
                    *existing = BookmarkSet::with_slots(path, owner, slots);
                }
                None => files.push(BookmarkSet::with_slots(path, folder.clone(), slots)),
            }
        }

        info!(files = files.len(), merge, "bookmark state loaded");
        self.files = files;
        Ok(())
    }

    /// Point every set at the folder that contains it.
    pub(crate) fn assign_folders(&mut self, folders: &[WorkspaceFolder]) {
        for set in &mut self.files {
            let owner = owning_folder(folders, set.path()).map(|folder| folder.root.clone());
            set.set_workspace_folder(owner);
        }
    }
}

/// The folder with the longest root containing `path`.
pub(crate) fn owning_folder<'a>(
    folders: &'a [WorkspaceFolder],
    path: &Path,
) -> Option<&'a WorkspaceFolder> {
    folders
        .iter()
        .filter(|folder| folder.contains(path))
        .max_by_key(|folder| folder.root.components().count())
}

#[cfg(any(windows, target_os = "macos"))]
pub(crate) fn same_path(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

#[cfg(not(any(windows, target_os = "macos")))]
pub(crate) fn same_path(a: &Path, b: &Path) -> bool {
    a == b
}
