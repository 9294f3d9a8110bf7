//! Domain models for bookmark slots, per-file bookmark sets, and workspace folders.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::errors::BookmarkError;

/// Number of numbered slots every file carries.
pub const SLOT_COUNT: usize = 10;

/// Wire sentinel for an unoccupied slot.
pub const NO_BOOKMARK: i64 = -1;

/// A validated slot index in `0..SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u8);

impl Slot {
    /// Validate a raw index coming from outside the core.
    pub fn new(index: usize) -> Result<Self, BookmarkError> {
        if index < SLOT_COUNT {
            Ok(Self(index as u8))
        } else {
            Err(BookmarkError::IndexOutOfRange { index })
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Every slot, in ascending order.
    pub fn all() -> impl Iterator<Item = Slot> {
        (0..SLOT_COUNT as u8).map(Slot)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A root folder of a (possibly multi-root) workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceFolder {
    pub name: String,
    pub root: PathBuf,
}

impl WorkspaceFolder {
    /// Build a folder named after the last component of `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self { name, root }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

/// Result of [`BookmarkSet::toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// `slot` now marks the requested line; `previous` is the line it held before.
    Set { slot: Slot, previous: Option<usize> },
    /// The requested line was already marked by `slot`, which is now empty.
    Cleared { slot: Slot },
}

/// The ten bookmark slots of a single file. Slots hold zero-based line numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkSet {
    path: PathBuf,
    workspace_folder: Option<PathBuf>,
    slots: [Option<usize>; SLOT_COUNT],
}

impl BookmarkSet {
    /// Create an empty set for `path`, optionally owned by the folder rooted at `workspace_folder`.
    pub fn new(path: impl Into<PathBuf>, workspace_folder: Option<PathBuf>) -> Self {
        Self::with_slots(path, workspace_folder, [None; SLOT_COUNT])
    }

    pub fn with_slots(
        path: impl Into<PathBuf>,
        workspace_folder: Option<PathBuf>,
        slots: [Option<usize>; SLOT_COUNT],
    ) -> Self {
        Self {
            path: path.into(),
            workspace_folder,
            slots,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root of the owning workspace folder, if any.
    pub fn workspace_folder(&self) -> Option<&Path> {
        self.workspace_folder.as_deref()
    }

    pub(crate) fn set_workspace_folder(&mut self, folder: Option<PathBuf>) {
        self.workspace_folder = folder;
    }

    pub fn slots(&self) -> &[Option<usize>; SLOT_COUNT] {
        &self.slots
    }

    pub fn get(&self, slot: Slot) -> Option<usize> {
        self.slots[slot.index()]
    }

    /// Read a slot by raw index, failing with [`BookmarkError::IndexOutOfRange`] past slot 9.
    pub fn line_at(&self, index: usize) -> Result<Option<usize>, BookmarkError> {
        Slot::new(index).map(|slot| self.get(slot))
    }

    /// The slot currently marking `line`, if any.
    pub fn slot_for_line(&self, line: usize) -> Option<Slot> {
        self.occupied()
            .find(|(_, marked)| *marked == line)
            .map(|(slot, _)| slot)
    }

    /// Toggle `slot` on `line`.
    ///
    /// When any slot already marks `line` that slot is cleared (re-marking a line removes the
    /// mark). Otherwise `slot` is overwritten with `line`.
    pub fn toggle(&mut self, slot: Slot, line: usize) -> ToggleOutcome {
        if let Some(existing) = self.slot_for_line(line) {
            self.slots[existing.index()] = None;
            return ToggleOutcome::Cleared { slot: existing };
        }

        let previous = self.slots[slot.index()].replace(line);
        ToggleOutcome::Set { slot, previous }
    }

    /// Clear one slot. Returns whether it was occupied.
    pub fn clear(&mut self, slot: Slot) -> bool {
        self.slots[slot.index()].take().is_some()
    }

    /// Clear every slot. Returns whether anything was occupied.
    pub fn clear_all(&mut self) -> bool {
        let changed = !self.is_empty();
        self.slots = [None; SLOT_COUNT];
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Occupied `(slot, line)` pairs in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = (Slot, usize)> + '_ {
        Slot::all().filter_map(|slot| self.get(slot).map(|line| (slot, line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: usize) -> Slot {
        Slot::new(index).expect("valid slot")
    }

    #[test]
    fn slot_rejects_out_of_range_index() {
        assert_eq!(
            Slot::new(10),
            Err(BookmarkError::IndexOutOfRange { index: 10 })
        );
        assert_eq!(Slot::all().count(), SLOT_COUNT);
    }

    #[test]
    fn toggle_twice_on_same_line_restores_empty_set() {
        let mut set = BookmarkSet::new("/a.txt", None);
        assert_eq!(
            set.toggle(slot(2), 7),
            ToggleOutcome::Set {
                slot: slot(2),
                previous: None
            }
        );
        assert_eq!(set.toggle(slot(2), 7), ToggleOutcome::Cleared { slot: slot(2) });
        assert!(set.is_empty());
        assert_eq!(set.slots().len(), SLOT_COUNT);
    }

    #[test]
    fn toggle_clears_whichever_slot_marks_the_line() {
        let mut set = BookmarkSet::new("/a.txt", None);
        set.toggle(slot(1), 3);

        let outcome = set.toggle(slot(5), 3);

        assert_eq!(outcome, ToggleOutcome::Cleared { slot: slot(1) });
        assert_eq!(set.get(slot(1)), None);
        assert_eq!(set.get(slot(5)), None);
    }

    #[test]
    fn toggle_overwrites_slot_on_new_line() {
        let mut set = BookmarkSet::new("/a.txt", None);
        set.toggle(slot(0), 1);

        let outcome = set.toggle(slot(0), 9);

        assert_eq!(
            outcome,
            ToggleOutcome::Set {
                slot: slot(0),
                previous: Some(1)
            }
        );
        assert_eq!(set.occupied().collect::<Vec<_>>(), vec![(slot(0), 9)]);
    }

    #[test]
    fn line_at_reports_index_out_of_range() {
        let set = BookmarkSet::new("/a.txt", None);
        assert_eq!(set.line_at(9), Ok(None));
        assert!(matches!(
            set.line_at(11),
            Err(BookmarkError::IndexOutOfRange { index: 11 })
        ));
    }

    #[test]
    fn clear_all_reports_whether_anything_changed() {
        let mut set = BookmarkSet::new("/a.txt", None);
        assert!(!set.clear_all());
        set.toggle(slot(4), 0);
        assert!(set.clear_all());
        assert!(set.is_empty());
    }
}
