//! Keeps bookmarks attached to their lines while the document is edited.
//!
//! Edits are line-granular: each [`LineEdit`] names the first and last pre-edit line it
//! rewrote and the net number of lines it added (negative when lines were removed). Edits of
//! one [`DocumentChange`] are applied in the order given, each against the result of the
//! previous one.
//!
//! Boundary rules:
//! - a mark above the edit never moves;
//! - a mark below the edit shifts by the edit's delta;
//! - a mark inside a rewritten range is lost, with two exceptions;
//! - with `keep_on_line_delete`, lost marks land on the edit's start line instead.
//!
//! Exceptions to losing a mark inside the range:
//! - a pure insertion at the marked line (`start == end`, `delta > 0`) pushes the mark down;
//! - an in-line edit (`start == end`, `delta == 0`) keeps the mark. Line-level edits cannot
//!   tell typing within a line from replacing it.

use tracing::debug;

use crate::domain::model::{BookmarkSet, SLOT_COUNT, Slot};

/// One line-level edit, expressed in pre-edit line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEdit {
    /// First rewritten line.
    pub start: usize,
    /// Last rewritten line, inclusive.
    pub end: usize,
    /// Net number of lines added (negative when lines were removed).
    pub delta: isize,
}

impl LineEdit {
    pub fn new(start: usize, end: usize, delta: isize) -> Self {
        Self { start, end, delta }
    }

    /// Replace the text spanning `start..=end` with text containing `inserted_lines` line breaks.
    pub fn replace(start: usize, end: usize, inserted_lines: usize) -> Self {
        let removed = end.saturating_sub(start) as isize;
        Self::new(start, end, inserted_lines as isize - removed)
    }

    /// Insert `count` whole lines at `line`.
    pub fn insert(line: usize, count: usize) -> Self {
        Self::new(line, line, count as isize)
    }

    /// Delete the whole lines `start..=end`.
    pub fn delete(start: usize, end: usize) -> Self {
        let (start, end) = (start.min(end), start.max(end));
        Self::new(start, end, -((end - start + 1) as isize))
    }

    fn bounds(&self) -> (usize, usize) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    fn is_pure_insertion(&self) -> bool {
        self.start == self.end && self.delta > 0
    }

    fn is_in_line(&self) -> bool {
        self.start == self.end && self.delta == 0
    }
}

/// Everything the editor reports about one change event of a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentChange {
    pub edits: Vec<LineEdit>,
    /// Line count after the change; `0` means the document has no content at all.
    pub line_count: usize,
}

impl DocumentChange {
    pub fn new(edits: Vec<LineEdit>, line_count: usize) -> Self {
        Self { edits, line_count }
    }

    /// Line count of `text` as an editor sees it, with empty text counting as zero lines.
    pub fn line_count_of(text: &str) -> usize {
        if text.is_empty() {
            0
        } else {
            text.matches('\n').count() + 1
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StickyOptions {
    /// Move marks on rewritten lines to the edit's start line instead of dropping them.
    pub keep_on_line_delete: bool,
}

/// Recomputes slot positions after document edits.
///
/// Never fails: malformed or overlapping edits only ever clear marks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StickyTracker {
    options: StickyOptions,
}

impl StickyTracker {
    pub fn new(options: StickyOptions) -> Self {
        Self { options }
    }

    /// Produce the bookmark set that results from applying `change` to `set`.
    pub fn apply(&self, set: &BookmarkSet, change: &DocumentChange) -> BookmarkSet {
        let mut slots = *set.slots();

        for edit in &change.edits {
            self.apply_edit(&mut slots, edit);
        }

        // An empty document (zero lines) drops every mark here too.
        for line in slots.iter_mut() {
            if line.is_some_and(|line| line >= change.line_count) {
                *line = None;
            }
        }

        if slots != *set.slots() {
            debug!(
                path = %set.path().display(),
                edits = change.edits.len(),
                line_count = change.line_count,
                "bookmarks repositioned"
            );
        }

        BookmarkSet::with_slots(
            set.path().to_path_buf(),
            set.workspace_folder().map(ToOwned::to_owned),
            slots,
        )
    }

    fn apply_edit(&self, slots: &mut [Option<usize>; SLOT_COUNT], edit: &LineEdit) {
        let (start, end) = edit.bounds();
        let mut displaced = Vec::new();

        for slot in Slot::all() {
            let entry = &mut slots[slot.index()];
            let Some(line) = *entry else {
                continue;
            };

            if line < start {
                continue;
            }

            if line > end {
                // A well-formed edit never moves trailing lines above its start.
                *entry = shift(line, edit.delta).filter(|shifted| *shifted >= start);
                continue;
            }

            // Exception to clearing: edits within a single line keep the mark.
            if edit.is_in_line() {
                continue;
            }

            if edit.is_pure_insertion() && line == start {
                *entry = shift(line, edit.delta);
                continue;
            }

            *entry = None;
            if self.options.keep_on_line_delete {
                displaced.push(slot);
            }
        }

        for slot in displaced {
            if slots.iter().all(|line| *line != Some(start)) {
                slots[slot.index()] = Some(start);
            }
        }
    }
}

fn shift(line: usize, delta: isize) -> Option<usize> {
    line.checked_add_signed(delta)
}
