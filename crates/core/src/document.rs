//! Document model and the proxy scripts use to reach it.
//!
//! The editor owns each document as a [`SharedDocument`]. The proxy only keeps
//! a `Weak` reference to whichever document is active, so a script can never
//! keep a closed document alive. Every mutation (content write, save) takes
//! the document's write lock, which gives one mutation in flight per document.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::error::DocumentError;

/// Characters per page when computing `page_count`.
pub const CHARS_PER_PAGE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    file_path: Option<PathBuf>,
    content: String,
    dirty: bool,
}

impl Document {
    /// Empty, untitled document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>, file_path: Option<PathBuf>) -> Self {
        Self { file_path, content: content.into(), dirty: false }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| DocumentError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_content(content, Some(path.to_path_buf())))
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// `max(1, ceil(chars / CHARS_PER_PAGE))`
    pub fn page_count(&self) -> usize {
        let chars = self.content.chars().count();
        chars.div_ceil(CHARS_PER_PAGE).max(1)
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.dirty = true;
    }

    /// File name with a `*` suffix while dirty.
    pub fn display_name(&self) -> String {
        let name = self
            .file_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        if self.dirty {
            format!("{}*", name)
        } else {
            name
        }
    }

    /// Atomic: write a sibling `.tmp` file, then rename it over `path`.
    fn write_to(&mut self, path: &Path) -> Result<(), DocumentError> {
        let io_err = |e: std::io::Error| DocumentError::Io(format!("{}: {}", path.display(), e));
        let tmp_path = temp_sibling(path);
        fs::write(&tmp_path, self.content.as_bytes()).map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }
        self.dirty = false;
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), DocumentError> {
        let path = self.file_path.clone().ok_or(DocumentError::NoSavePath)?;
        self.write_to(&path)
    }

    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> Result<(), DocumentError> {
        let path = path.into();
        self.write_to(&path)?;
        self.file_path = Some(path);
        Ok(())
    }
}

/// `notes.txt` -> `notes.txt.tmp` in the same directory.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A document plus the locks that guard it.
#[derive(Debug, Default)]
pub struct DocumentCell {
    state: RwLock<Document>,
    run_gate: Mutex<()>,
}

pub type SharedDocument = Arc<DocumentCell>;

impl DocumentCell {
    pub fn new(document: Document) -> SharedDocument {
        Arc::new(Self { state: RwLock::new(document), run_gate: Mutex::new(()) })
    }

    /// Copy of the current document state.
    pub fn snapshot(&self) -> Document {
        self.state.read().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.state.read())
    }

    /// Run `f` with exclusive access. Other readers and writers wait.
    pub fn write<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Blocks until no other script run holds this document.
    pub fn lock_run(&self) -> MutexGuard<'_, ()> {
        self.run_gate.lock()
    }

    /// `None` when another script run holds this document.
    pub fn try_lock_run(&self) -> Option<MutexGuard<'_, ()>> {
        self.run_gate.try_lock()
    }
}

/// Script-side view of the active document.
///
/// Cloning shares the same slot, so the editor activating another document is
/// seen by every clone.
#[derive(Debug, Clone, Default)]
pub struct DocumentProxy {
    active: Arc<RwLock<Option<Weak<DocumentCell>>>>,
}

impl DocumentProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, document: &SharedDocument) {
        *self.active.write() = Some(Arc::downgrade(document));
    }

    pub fn deactivate(&self) {
        *self.active.write() = None;
    }

    /// The active document, if one is set and still alive.
    pub fn current(&self) -> Option<SharedDocument> {
        self.active.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn has_document(&self) -> bool {
        self.current().is_some()
    }

    fn require(&self) -> Result<SharedDocument, DocumentError> {
        self.current().ok_or(DocumentError::Unavailable)
    }

    pub fn read_content(&self) -> Result<String, DocumentError> {
        Ok(self.require()?.read(|d| d.content().to_string()))
    }

    pub fn write_content(&self, text: impl Into<String>) -> Result<(), DocumentError> {
        let text = text.into();
        self.require()?.write(|d| d.set_content(text));
        Ok(())
    }

    /// Persist the content as it is at the moment of the call and clear the
    /// dirty flag. The write lock is held for the whole write.
    pub fn save(&self) -> Result<(), DocumentError> {
        self.require()?.write(|d| d.save())
    }

    pub fn save_as(&self, path: impl Into<PathBuf>) -> Result<(), DocumentError> {
        let path = path.into();
        self.require()?.write(|d| d.save_as(path))
    }

    pub fn file_path(&self) -> Result<Option<PathBuf>, DocumentError> {
        Ok(self.require()?.read(|d| d.file_path().map(Path::to_path_buf)))
    }

    pub fn page_count(&self) -> Result<usize, DocumentError> {
        Ok(self.require()?.read(Document::page_count))
    }

    pub fn is_dirty(&self) -> Result<bool, DocumentError> {
        Ok(self.require()?.read(Document::is_dirty))
    }
}
