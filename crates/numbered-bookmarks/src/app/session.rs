//! Session context owned by the host: scoped stores, their writers, settings, and notices.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::app::navigation::{NavigationPolicy, NavigationResolver, Resolution};
use crate::app::paths::{PathDisplayResolver, PathLabel};
use crate::app::sticky::{DocumentChange, StickyOptions, StickyTracker};
use crate::app::store::{Controller, StoreScope, owning_folder, same_path};
use crate::domain::errors::BookmarkError;
use crate::domain::model::{Slot, ToggleOutcome, WorkspaceFolder};
use crate::infra::config::Config;
use crate::infra::persistence::{JsonFileSink, StateSink, StateWriter};

/// Settings consulted on every operation. Replace them with [`Session::reconfigure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub policy: NavigationPolicy,
    pub show_not_defined_warning: bool,
    pub save_in_project: bool,
    /// Project file location, relative to each folder root.
    pub project_file: PathBuf,
    pub sticky: StickyOptions,
}

impl Settings {
    /// Build settings from configuration. An unknown policy falls back to strict.
    pub fn from_config(config: &Config) -> Self {
        let policy = config
            .navigation
            .policy()
            .parse()
            .unwrap_or_else(|err| {
                warn!(error = %err, "falling back to strict navigation");
                NavigationPolicy::Strict
            });
        Self {
            policy,
            show_not_defined_warning: config.navigation.show_not_defined_warning(),
            save_in_project: config.persistence.save_in_project(),
            project_file: config.persistence.project_file(),
            sticky: StickyOptions {
                keep_on_line_delete: config.sticky.keep_on_line_delete(),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible message raised by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        write!(f, "{level}: {}", self.message)
    }
}

/// Where session-scoped state is kept.
#[derive(Clone)]
pub enum SessionStorage {
    /// A JSON state file under `state_dir`, keyed by the workspace path.
    StateDir { state_dir: PathBuf, workspace: PathBuf },
    /// A host-provided sink.
    Sink(Arc<dyn StateSink>),
}

impl SessionStorage {
    fn sink(&self) -> Arc<dyn StateSink> {
        match self {
            SessionStorage::StateDir {
                state_dir,
                workspace,
            } => Arc::new(JsonFileSink::session(state_dir, workspace)),
            SessionStorage::Sink(sink) => sink.clone(),
        }
    }
}

pub struct SessionOptions {
    pub folders: Vec<WorkspaceFolder>,
    pub settings: Settings,
    pub storage: SessionStorage,
}

/// Which bookmarks [`Session::list`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    Active,
    AllFiles,
}

/// One occupied slot in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub slot: Slot,
    pub path: PathBuf,
    pub line: usize,
    pub label: PathLabel,
}

struct ScopedStore {
    controller: Controller,
    writer: StateWriter,
    /// False when the existing state could not be read; writing would overwrite it.
    writable: bool,
}

/// Everything one editing session needs, passed explicitly to every operation.
pub struct Session {
    folders: Vec<WorkspaceFolder>,
    settings: Settings,
    storage: SessionStorage,
    stores: Vec<ScopedStore>,
    active: Option<PathBuf>,
    notices: Vec<Notice>,
}

impl Session {
    /// Build the store scopes for `options.settings` and load their persisted state.
    ///
    /// Bad state never fails the session. Corrupt state is moved aside with a warning notice.
    /// State that cannot be read stays in place, raises an error notice, and its store is
    /// not saved. Files the session state holds for a folder with its own store move there.
    pub fn open(options: SessionOptions) -> Result<Self> {
        let SessionOptions {
            folders,
            settings,
            storage,
        } = options;
        let mut session = Self {
            folders,
            settings,
            storage,
            stores: Vec::new(),
            active: None,
            notices: Vec::new(),
        };
        for scope in session.scopes() {
            let store = session.load_store(scope)?;
            session.stores.push(store);
        }
        for index in session.rehome_folder_files() {
            session.persist(index);
        }
        Ok(session)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn folders(&self) -> &[WorkspaceFolder] {
        &self.folders
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    /// Make `path` the active document, tracking it if it is new.
    pub fn open_document(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.track(&path);
        self.active = Some(path);
    }

    /// Toggle `slot` on `line` of the active document.
    pub fn toggle(&mut self, slot: Slot, line: usize) -> Result<ToggleOutcome> {
        let active = self.require_active()?;
        let policy = self.settings.policy;
        let index = self.track(&active);

        let outcome = self.stores[index]
            .controller
            .toggle(&active, slot, line, policy);
        info!(path = %active.display(), %slot, line, ?outcome, %policy, "toggled bookmark");

        self.persist(index);
        Ok(outcome)
    }

    /// Resolve a jump to `slot` from the active document.
    pub fn jump(&mut self, slot: Slot, cursor_line: Option<usize>) -> Result<Resolution> {
        let active = self.require_active()?;
        let index = self.store_index(&active);
        let resolution = NavigationResolver::new(self.settings.policy).resolve(
            &self.stores[index].controller,
            &active,
            slot,
            cursor_line,
        );

        if let Resolution::NotDefined { slot } = &resolution
            && self.settings.show_not_defined_warning
        {
            self.notify(NoticeLevel::Info, format!("Bookmark {slot} is not defined"));
        }
        Ok(resolution)
    }

    /// Reposition the bookmarks of `path` after an edit. Returns whether any slot changed.
    pub fn apply_change(&mut self, path: &Path, change: &DocumentChange) -> bool {
        let index = self.store_index(path);
        let tracker = StickyTracker::new(self.settings.sticky);
        let controller = &mut self.stores[index].controller;
        let Some(set) = controller.lookup(path) else {
            return false;
        };

        let updated = tracker.apply(set, change);
        if !controller.update(updated) {
            return false;
        }
        self.persist(index);
        true
    }

    pub fn clear_slot(&mut self, path: &Path, slot: Slot) -> bool {
        let index = self.store_index(path);
        let changed = self.stores[index].controller.clear_slot(path, slot);
        if changed {
            self.persist(index);
        }
        changed
    }

    pub fn clear_file(&mut self, path: &Path) -> bool {
        let index = self.store_index(path);
        let changed = self.stores[index].controller.clear_all_in(path);
        if changed {
            self.persist(index);
        }
        changed
    }

    pub fn clear_all_files(&mut self) -> bool {
        let mut any = false;
        for index in 0..self.stores.len() {
            if self.stores[index].controller.clear_all_files() {
                self.persist(index);
                any = true;
            }
        }
        any
    }

    /// Stop tracking `path`, e.g. after the file was deleted. Returns whether it was tracked.
    pub fn remove_file(&mut self, path: &Path) -> bool {
        let index = self.store_index(path);
        if self.stores[index].controller.remove_file(path).is_none() {
            return false;
        }
        if self
            .active
            .as_deref()
            .is_some_and(|active| same_path(active, path))
        {
            self.active = None;
        }
        self.persist(index);
        true
    }

    /// Occupied `(slot, line)` pairs of `path`, for gutter rendering.
    pub fn occupied(&self, path: &Path) -> Vec<(Slot, usize)> {
        self.stores[self.store_index(path)]
            .controller
            .lookup(path)
            .map(|set| set.occupied().collect())
            .unwrap_or_default()
    }

    /// Occupied slots across files, ordered for display.
    pub fn list(&self, scope: ListScope) -> Vec<ListEntry> {
        let current = self
            .active
            .as_deref()
            .and_then(|active| owning_folder(&self.folders, active))
            .map(|folder| folder.root.as_path());
        let resolver = PathDisplayResolver::new(&self.folders, current);

        let mut entries = Vec::new();
        for set in self.stores.iter().flat_map(|store| store.controller.files()) {
            if scope == ListScope::Active
                && !self
                    .active
                    .as_deref()
                    .is_some_and(|active| same_path(active, set.path()))
            {
                continue;
            }
            let label = resolver.label(set.path());
            for (slot, line) in set.occupied() {
                entries.push(ListEntry {
                    slot,
                    path: set.path().to_path_buf(),
                    line,
                    label: label.clone(),
                });
            }
        }

        entries.sort_by(|a, b| {
            resolver
                .compare(&a.path, &b.path)
                .then_with(|| a.line.cmp(&b.line))
        });
        entries
    }

    /// Apply changed settings. Switching where state is saved moves every tracked file into
    /// the new stores and persists them there.
    pub fn reconfigure(&mut self, settings: Settings) -> Result<()> {
        let repartition = settings.save_in_project != self.settings.save_in_project
            || (settings.save_in_project && settings.project_file != self.settings.project_file);
        self.settings = settings;
        if !repartition {
            return Ok(());
        }

        info!(
            save_in_project = self.settings.save_in_project,
            "moving bookmarks to new stores"
        );
        let mut carried = Vec::new();
        for store in std::mem::take(&mut self.stores) {
            store.writer.flush();
            for err in store.writer.take_failures() {
                self.notify(NoticeLevel::Error, err.to_string());
            }
            carried.extend(store.controller.files().iter().cloned());
        }

        for scope in self.scopes() {
            let store = self.load_store(scope)?;
            self.stores.push(store);
        }
        self.rehome_folder_files();
        for set in carried {
            let index = self.store_index(set.path());
            self.stores[index].controller.update(set);
        }
        for index in 0..self.stores.len() {
            self.stores[index].controller.assign_folders(&self.folders);
            self.persist(index);
        }
        Ok(())
    }

    /// Wait for every pending write to finish.
    pub fn flush(&mut self) {
        for store in &self.stores {
            store.writer.flush();
        }
        self.collect_write_failures();
    }

    /// Drain notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.collect_write_failures();
        std::mem::take(&mut self.notices)
    }

    /// Flush and end the session, returning any notices not yet taken.
    pub fn close(mut self) -> Vec<Notice> {
        self.flush();
        self.take_notices()
    }

    fn scopes(&self) -> Vec<StoreScope> {
        let mut scopes = Vec::new();
        if self.settings.save_in_project {
            scopes.extend(self.folders.iter().cloned().map(StoreScope::Folder));
        }
        scopes.push(StoreScope::Session);
        scopes
    }

    fn sink_for(&self, scope: &StoreScope) -> Arc<dyn StateSink> {
        match scope {
            StoreScope::Folder(folder) => Arc::new(JsonFileSink::project(
                &folder.root,
                &self.settings.project_file,
            )),
            StoreScope::Session => self.storage.sink(),
        }
    }

    fn load_store(&mut self, scope: StoreScope) -> Result<ScopedStore> {
        let sink = self.sink_for(&scope);
        let mut controller = Controller::new(scope);

        let loaded = sink.load().and_then(|document| match document {
            Some(document) => controller.deserialize(&document, false),
            None => Ok(()),
        });
        let mut writable = true;
        match loaded {
            Ok(()) => {}
            Err(err @ BookmarkError::CorruptState { .. }) => {
                warn!(location = %sink.location(), error = %err, "discarding corrupt bookmark state");
                let mut message = format!(
                    "Bookmarks in {} could not be loaded and were reset: {err}",
                    sink.location()
                );
                match sink.quarantine() {
                    Ok(Some(moved)) => {
                        message.push_str(&format!(" (previous file kept at {})", moved.display()));
                    }
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "failed to move corrupt state aside"),
                }
                self.notify(NoticeLevel::Warning, message);
            }
            Err(err) => {
                warn!(location = %sink.location(), error = %err, "bookmark state unavailable");
                self.notify(
                    NoticeLevel::Error,
                    format!("{err}; bookmark changes there will not be saved"),
                );
                writable = false;
            }
        }

        controller.assign_folders(&self.folders);
        let writer = StateWriter::spawn(sink)?;
        Ok(ScopedStore {
            controller,
            writer,
            writable,
        })
    }

    /// Index of the store owning `path`: its folder's store in save-in-project mode, the
    /// session store otherwise.
    fn store_index(&self, path: &Path) -> usize {
        let owner = owning_folder(&self.folders, path).map(|folder| folder.root.as_path());
        self.stores
            .iter()
            .position(|store| {
                store
                    .controller
                    .scope()
                    .folder()
                    .is_some_and(|folder| Some(folder.root.as_path()) == owner)
            })
            .or_else(|| {
                self.stores
                    .iter()
                    .position(|store| *store.controller.scope() == StoreScope::Session)
            })
            .unwrap_or_default()
    }

    /// Move sets the session store holds for paths owned by a folder store into that store,
    /// keeping the folder store's copy when it has one. Returns the indices of changed stores.
    fn rehome_folder_files(&mut self) -> Vec<usize> {
        let Some(session_index) = self
            .stores
            .iter()
            .position(|store| *store.controller.scope() == StoreScope::Session)
        else {
            return Vec::new();
        };

        let misplaced: Vec<PathBuf> = self.stores[session_index]
            .controller
            .files()
            .iter()
            .map(|set| set.path().to_path_buf())
            .filter(|path| self.store_index(path) != session_index)
            .collect();

        let mut changed = Vec::new();
        for path in misplaced {
            let Some(set) = self.stores[session_index].controller.remove_file(&path) else {
                continue;
            };
            changed.push(session_index);
            let target = self.store_index(&path);
            let folder_store = &mut self.stores[target].controller;
            if folder_store.lookup(&path).is_none() {
                debug!(path = %path.display(), "moving session bookmarks into folder store");
                folder_store.update(set);
                changed.push(target);
            }
        }
        changed.sort_unstable();
        changed.dedup();
        changed
    }

    fn track(&mut self, path: &Path) -> usize {
        let index = self.store_index(path);
        let owner = owning_folder(&self.folders, path).map(|folder| folder.root.clone());
        self.stores[index].controller.add_file(path, owner);
        index
    }

    fn require_active(&self) -> Result<PathBuf> {
        self.active
            .clone()
            .context("no active document; open one first")
    }

    fn persist(&mut self, index: usize) {
        let store = &self.stores[index];
        if !store.writable {
            debug!(scope = ?store.controller.scope(), "skipping write to unreadable state");
            return;
        }
        store.writer.submit(store.controller.serialize());
        self.collect_write_failures();
    }

    fn collect_write_failures(&mut self) {
        for store in &self.stores {
            for err in store.writer.take_failures() {
                self.notices.push(Notice {
                    level: NoticeLevel::Error,
                    message: err.to_string(),
                });
            }
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
    }
}
