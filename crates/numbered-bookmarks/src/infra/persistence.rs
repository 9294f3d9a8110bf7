//! Persisted bookmark documents and the background writer that stores them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

use crate::domain::errors::BookmarkError;
use crate::domain::model::{BookmarkSet, NO_BOOKMARK, SLOT_COUNT, Slot};

/// Placeholder for the folder root in project-scoped documents.
pub const ROOT_PLACEHOLDER: &str = "$ROOTPATH$";

const STATE_DIR: &str = "numbered-bookmarks/workspaces";

/// Serializable representation of a [`BookmarkSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub path: String,
    /// Line per slot, `-1` for an empty slot.
    pub bookmarks: Vec<i64>,
}

impl From<&BookmarkSet> for BookmarkRecord {
    fn from(set: &BookmarkSet) -> Self {
        Self {
            path: set.path().display().to_string(),
            bookmarks: set
                .slots()
                .iter()
                .map(|line| line.map_or(NO_BOOKMARK, |line| line as i64))
                .collect(),
        }
    }
}

impl BookmarkRecord {
    /// Validate the wire slots and convert them into line numbers.
    pub fn slots(&self) -> Result<[Option<usize>; SLOT_COUNT], BookmarkError> {
        if self.bookmarks.len() != SLOT_COUNT {
            return Err(BookmarkError::corrupt(format!(
                "record for {} has {} slots, expected {SLOT_COUNT}",
                self.path,
                self.bookmarks.len()
            )));
        }

        let mut slots = [None; SLOT_COUNT];
        for (slot, &value) in Slot::all().zip(&self.bookmarks) {
            slots[slot.index()] = match value {
                NO_BOOKMARK => None,
                line if line >= 0 => Some(line as usize),
                other => {
                    return Err(BookmarkError::corrupt(format!(
                        "record for {} has invalid line {other} in slot {slot}",
                        self.path
                    )));
                }
            };
        }
        Ok(slots)
    }
}

/// Ordered list of records, stored as a top-level JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkDocument {
    records: Vec<BookmarkRecord>,
}

impl BookmarkDocument {
    pub fn new(records: Vec<BookmarkRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[BookmarkRecord] {
        &self.records
    }

    pub fn from_json(data: &str) -> Result<Self, BookmarkError> {
        serde_json::from_str(data).map_err(|err| BookmarkError::corrupt(err.to_string()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Rewrite paths under `root` as `$ROOTPATH$/<relative>`.
    pub fn relative_to(mut self, root: &Path) -> Self {
        for record in &mut self.records {
            if let Ok(relative) = Path::new(&record.path).strip_prefix(root) {
                let relative = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                record.path = format!("{ROOT_PLACEHOLDER}/{relative}");
            }
        }
        self
    }

    /// Expand `$ROOTPATH$` placeholders against `root`.
    pub fn expanded(mut self, root: &Path) -> Self {
        for record in &mut self.records {
            if let Some(rest) = record.path.strip_prefix(ROOT_PLACEHOLDER) {
                let rest = rest.trim_start_matches(['/', '\\']);
                record.path = root.join(rest).display().to_string();
            }
        }
        self
    }
}

/// Backing storage for one store's document.
pub trait StateSink: Send + Sync {
    /// Load the stored document; an absent document is `Ok(None)`.
    fn load(&self) -> Result<Option<BookmarkDocument>, BookmarkError>;

    fn save(&self, document: &BookmarkDocument) -> Result<(), BookmarkError>;

    /// Human readable location used in logs and notices.
    fn location(&self) -> String;

    /// Move an unreadable document out of the way. Returns where it went.
    fn quarantine(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// JSON document on disk, optionally with paths relative to a project root.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
    root: Option<PathBuf>,
}

impl JsonFileSink {
    /// Project file inside `root`, storing paths relative to it.
    pub fn project(root: impl Into<PathBuf>, relative_file: impl AsRef<Path>) -> Self {
        let root = root.into();
        Self {
            path: root.join(relative_file),
            root: Some(root),
        }
    }

    /// Session state file for `workspace` under `state_dir`, storing absolute paths.
    pub fn session(state_dir: &Path, workspace: &Path) -> Self {
        Self {
            path: state_dir.join(STATE_DIR).join(state_file_name(workspace)),
            root: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_failed(&self, reason: impl ToString) -> BookmarkError {
        BookmarkError::PersistenceWriteFailed {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl StateSink for JsonFileSink {
    fn load(&self) -> Result<Option<BookmarkDocument>, BookmarkError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&self.path).map_err(|err| {
            BookmarkError::PersistenceReadFailed {
                path: self.path.clone(),
                reason: err.to_string(),
            }
        })?;
        let document = BookmarkDocument::from_json(&data)?;
        Ok(Some(match &self.root {
            Some(root) => document.expanded(root),
            None => document,
        }))
    }

    fn save(&self, document: &BookmarkDocument) -> Result<(), BookmarkError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| self.write_failed("state path has no parent directory"))?;
        fs::create_dir_all(dir).map_err(|err| self.write_failed(err))?;

        let document = match &self.root {
            Some(root) => document.clone().relative_to(root),
            None => document.clone(),
        };
        let data = document.to_json().map_err(|err| self.write_failed(err))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|err| self.write_failed(err))?;
        file.write_all(data.as_bytes())
            .map_err(|err| self.write_failed(err))?;
        file.persist(&self.path)
            .map_err(|err| self.write_failed(err.error))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn quarantine(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let timestamp = OffsetDateTime::now_utc()
            .format(format_description!("[year][month][day]-[hour][minute][second]"))?;
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bookmarks.json".into());
        let target = self
            .path
            .with_file_name(format!("{file_name}.corrupt-{timestamp}"));
        fs::rename(&self.path, &target).with_context(|| {
            format!(
                "failed to move corrupt state {} aside",
                self.path.display()
            )
        })?;
        Ok(Some(target))
    }
}

/// In-process document storage for hosts that keep session state themselves.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the sink with raw JSON, as a host restoring its saved state would.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(Some(contents.into()))),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }
}

impl StateSink for MemorySink {
    fn load(&self) -> Result<Option<BookmarkDocument>, BookmarkError> {
        self.contents
            .lock()
            .as_deref()
            .map(BookmarkDocument::from_json)
            .transpose()
    }

    fn save(&self, document: &BookmarkDocument) -> Result<(), BookmarkError> {
        let data = document
            .to_json()
            .map_err(|err| BookmarkError::PersistenceWriteFailed {
                path: PathBuf::from("<memory>"),
                reason: err.to_string(),
            })?;
        *self.contents.lock() = Some(data);
        Ok(())
    }

    fn location(&self) -> String {
        "session state".into()
    }

    fn quarantine(&self) -> Result<Option<PathBuf>> {
        self.contents.lock().take();
        Ok(None)
    }
}

/// Default root for session state files.
pub fn default_state_dir() -> Option<PathBuf> {
    dirs_next::data_dir()
}

fn state_file_name(workspace: &Path) -> String {
    let key: String = workspace
        .display()
        .to_string()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.json", key.trim_matches('_'))
}

#[derive(Debug, Default)]
struct WriterState {
    pending: Option<BookmarkDocument>,
    in_flight: bool,
    shutdown: bool,
    failures: Vec<BookmarkError>,
}

struct WriterInner {
    state: Mutex<WriterState>,
    cv: Condvar,
    sink: Arc<dyn StateSink>,
}

/// Writes documents to a sink on a background thread, one write at a time.
///
/// Submitting while a write is pending replaces the pending document, so bursts of
/// mutations collapse into a single write of the latest state.
pub struct StateWriter {
    inner: Arc<WriterInner>,
    worker: Option<JoinHandle<()>>,
}

impl StateWriter {
    pub fn spawn(sink: Arc<dyn StateSink>) -> Result<Self> {
        let inner = Arc::new(WriterInner {
            state: Mutex::new(WriterState::default()),
            cv: Condvar::new(),
            sink,
        });

        let worker = std::thread::Builder::new()
            .name("bookmark-writer".to_owned())
            .spawn({
                let inner = inner.clone();
                move || run_worker(&inner)
            })
            .context("failed to spawn bookmark writer thread")?;

        Ok(Self {
            inner,
            worker: Some(worker),
        })
    }

    /// Queue `document` for writing, replacing any document still waiting.
    pub fn submit(&self, document: BookmarkDocument) {
        let mut state = self.inner.state.lock();
        if state.pending.replace(document).is_some() {
            debug!(location = %self.inner.sink.location(), "coalesced pending write");
        }
        self.inner.cv.notify_all();
    }

    /// Block until nothing is pending or in flight.
    pub fn flush(&self) {
        let mut state = self.inner.state.lock();
        while state.pending.is_some() || state.in_flight {
            self.inner.cv.wait(&mut state);
        }
    }

    /// Failed writes since the last call.
    pub fn take_failures(&self) -> Vec<BookmarkError> {
        std::mem::take(&mut self.inner.state.lock().failures)
    }
}

impl Drop for StateWriter {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            self.inner.cv.notify_all();
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("bookmark writer thread panicked");
        }
    }
}

fn run_worker(inner: &WriterInner) {
    loop {
        let document = {
            let mut state = inner.state.lock();
            loop {
                if let Some(document) = state.pending.take() {
                    state.in_flight = true;
                    break document;
                }
                if state.shutdown {
                    return;
                }
                inner.cv.wait(&mut state);
            }
        };

        let result = inner.sink.save(&document);

        let mut state = inner.state.lock();
        state.in_flight = false;
        match result {
            Ok(()) => debug!(
                location = %inner.sink.location(),
                files = document.records().len(),
                "bookmark state written"
            ),
            Err(err) => {
                warn!(error = %err, "bookmark state write failed");
                state.failures.push(err);
            }
        }
        inner.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(path: &str, marks: &[(usize, i64)]) -> BookmarkRecord {
        let mut bookmarks = vec![NO_BOOKMARK; SLOT_COUNT];
        for &(slot, line) in marks {
            bookmarks[slot] = line;
        }
        BookmarkRecord {
            path: path.into(),
            bookmarks,
        }
    }

    #[test]
    fn parses_wire_document() -> Result<()> {
        let document = BookmarkDocument::from_json(
            r#"[{"path": "/a.txt", "bookmarks": [4, -1, -1, -1, -1, -1, -1, -1, -1, 0]}]"#,
        )?;
        let slots = document.records()[0].slots()?;
        assert_eq!(slots[0], Some(4));
        assert_eq!(slots[9], Some(0));
        assert!(slots[1..9].iter().all(Option::is_none));
        Ok(())
    }

    #[test]
    fn rejects_malformed_documents() {
        for data in [
            r#"{"path": "/a.txt"}"#,
            r#"[{"bookmarks": [-1, -1, -1, -1, -1, -1, -1, -1, -1, -1]}]"#,
            r#"[{"path": "/a.txt"}]"#,
            "not json",
        ] {
            assert!(
                matches!(
                    BookmarkDocument::from_json(data),
                    Err(BookmarkError::CorruptState { .. })
                ),
                "accepted {data}"
            );
        }

        let short = record("/a.txt", &[]);
        let short = BookmarkRecord {
            bookmarks: short.bookmarks[..9].to_vec(),
            ..short
        };
        assert!(short.slots().is_err());
        assert!(record("/a.txt", &[(2, -7)]).slots().is_err());
    }

    #[test]
    fn project_paths_use_root_placeholder() {
        let root = Path::new("/work/repo");
        let document = BookmarkDocument::new(vec![
            record("/work/repo/src/lib.rs", &[(1, 3)]),
            record("/other/file.rs", &[]),
        ]);

        let relative = document.clone().relative_to(root);
        assert_eq!(relative.records()[0].path, "$ROOTPATH$/src/lib.rs");
        assert_eq!(relative.records()[1].path, "/other/file.rs");

        let expanded = relative.expanded(root);
        assert_eq!(expanded, document);
    }

    #[test]
    fn json_file_sink_round_trips_and_tolerates_absence() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("repo");
        let sink = JsonFileSink::project(&root, ".vscode/numbered-bookmarks.json");
        assert_eq!(sink.load()?, None);

        let path = root.join("src/main.rs").display().to_string();
        let document = BookmarkDocument::new(vec![record(&path, &[(0, 12)])]);
        sink.save(&document)?;

        let raw = fs::read_to_string(sink.path())?;
        assert!(raw.contains("$ROOTPATH$/src/main.rs"));
        assert_eq!(sink.load()?, Some(document));
        Ok(())
    }

    #[test]
    fn session_sink_names_file_after_workspace() {
        let sink = JsonFileSink::session(Path::new("/data"), Path::new("/home/me/my repo"));
        assert_eq!(
            sink.path(),
            Path::new("/data/numbered-bookmarks/workspaces/home_me_my_repo.json")
        );
    }

    #[test]
    fn quarantine_moves_corrupt_file_aside() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let sink = JsonFileSink::project(temp.path(), "bookmarks.json");
        fs::write(sink.path(), "{ broken")?;

        assert!(sink.load().is_err());
        let moved = sink.quarantine()?.expect("file moved");

        assert!(!sink.path().exists());
        assert!(moved.exists());
        assert!(
            moved
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("bookmarks.json.corrupt-"))
        );
        Ok(())
    }

    #[test]
    fn unreadable_state_is_a_read_failure_not_corruption() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let sink = JsonFileSink::project(temp.path(), "bookmarks.json");
        // A directory in place of the file fails to read regardless of permissions.
        fs::create_dir(sink.path())?;

        assert!(matches!(
            sink.load(),
            Err(BookmarkError::PersistenceReadFailed { .. })
        ));
        Ok(())
    }

    struct CountingSink {
        inner: MemorySink,
        writes: AtomicUsize,
        fail: bool,
    }

    impl StateSink for CountingSink {
        fn load(&self) -> Result<Option<BookmarkDocument>, BookmarkError> {
            self.inner.load()
        }

        fn save(&self, document: &BookmarkDocument) -> Result<(), BookmarkError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BookmarkError::PersistenceWriteFailed {
                    path: PathBuf::from("/read-only/bookmarks.json"),
                    reason: "permission denied".into(),
                });
            }
            self.inner.save(document)
        }

        fn location(&self) -> String {
            "counting".into()
        }
    }

    #[test]
    fn writer_persists_latest_document() -> Result<()> {
        let sink = Arc::new(CountingSink {
            inner: MemorySink::new(),
            writes: AtomicUsize::new(0),
            fail: false,
        });
        let writer = StateWriter::spawn(sink.clone())?;

        for line in 0..20 {
            writer.submit(BookmarkDocument::new(vec![record("/a.txt", &[(0, line)])]));
        }
        writer.flush();

        let writes = sink.writes.load(Ordering::SeqCst);
        assert!((1..=20).contains(&writes));
        let stored = sink.inner.load()?.expect("document written");
        assert_eq!(stored.records()[0].bookmarks[0], 19);
        assert!(writer.take_failures().is_empty());
        Ok(())
    }

    #[test]
    fn writer_reports_failures_and_keeps_running() -> Result<()> {
        let sink = Arc::new(CountingSink {
            inner: MemorySink::new(),
            writes: AtomicUsize::new(0),
            fail: true,
        });
        let writer = StateWriter::spawn(sink.clone())?;

        writer.submit(BookmarkDocument::default());
        writer.flush();
        let failures = writer.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            BookmarkError::PersistenceWriteFailed { .. }
        ));

        writer.submit(BookmarkDocument::default());
        writer.flush();
        assert_eq!(sink.writes.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn dropping_writer_drains_pending_document() -> Result<()> {
        let sink = MemorySink::new();
        {
            let writer = StateWriter::spawn(Arc::new(sink.clone()))?;
            writer.submit(BookmarkDocument::new(vec![record("/b.txt", &[(3, 1)])]));
        }
        assert!(sink.contents().is_some_and(|raw| raw.contains("/b.txt")));
        Ok(())
    }
}
