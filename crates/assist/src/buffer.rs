//! Text editing buffer for the script editor.
//!
//! Cursor and selection are byte offsets on char boundaries. Every mutation
//! bumps `revision`, which the suggestion engine uses to notice edits made
//! while a suggestion is outstanding.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BufferId(pub u64);

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buffer-{}", self.0)
    }
}

#[derive(Debug)]
pub struct EditorBuffer {
    id: BufferId,
    text: String,
    cursor: usize,
    selection: Option<Range<usize>>,
    revision: u64,
}

/// Snap a byte position to the nearest char boundary at or before it.
fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

/// Normalize \r\n and lone \r to \n. Avoids allocation if no \r is present.
fn normalize_newlines(text: &str) -> std::borrow::Cow<'_, str> {
    if text.as_bytes().contains(&b'\r') {
        text.replace("\r\n", "\n").replace('\r', "\n").into()
    } else {
        text.into()
    }
}

impl Default for EditorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorBuffer {
    pub fn new() -> Self {
        Self {
            id: BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
            text: String::new(),
            cursor: 0,
            selection: None,
            revision: 0,
        }
    }

    /// Buffer holding `text`, cursor at the end.
    pub fn with_text(text: &str) -> Self {
        let mut buf = Self::new();
        buf.set_text(text);
        buf
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Replace contents, cursor to end. Normalizes CRLF/CR to LF.
    pub fn set_text(&mut self, text: &str) {
        self.text = normalize_newlines(text).into_owned();
        self.cursor = self.text.len();
        self.selection = None;
        self.touch();
    }

    pub fn set_cursor(&mut self, pos: usize) {
        self.cursor = snap_to_char_boundary(&self.text, pos);
        self.selection = None;
    }

    /// Select `range` (clamped, snapped); the cursor moves to its end.
    pub fn select(&mut self, range: Range<usize>) {
        let start = snap_to_char_boundary(&self.text, range.start);
        let end = snap_to_char_boundary(&self.text, range.end).max(start);
        self.cursor = end;
        self.selection = (start < end).then_some(start..end);
    }

    pub fn selection(&self) -> Option<Range<usize>> {
        self.selection.clone()
    }

    pub fn selected_text(&self) -> &str {
        self.selection.as_ref().map(|r| &self.text[r.clone()]).unwrap_or("")
    }

    /// Insert at the cursor, replacing the selection if there is one.
    pub fn insert(&mut self, text: &str) {
        let range = self.selection.take().unwrap_or(self.cursor..self.cursor);
        self.replace_range(range, text);
    }

    /// Replace `range` with `text`; the cursor lands after the inserted text.
    pub fn replace_range(&mut self, range: Range<usize>, text: &str) {
        let start = snap_to_char_boundary(&self.text, range.start);
        let end = snap_to_char_boundary(&self.text, range.end).max(start);
        let text = normalize_newlines(text);
        self.text.replace_range(start..end, &text);
        self.cursor = start + text.len();
        self.selection = None;
        self.touch();
    }

    /// Delete the selection, or the character before the cursor.
    pub fn backspace(&mut self) {
        if let Some(range) = self.selection.take() {
            self.replace_range(range, "");
        } else if self.cursor > 0 {
            let prev = self.text[..self.cursor].char_indices().last().map(|(i, _)| i).unwrap_or(0);
            self.replace_range(prev..self.cursor, "");
        }
    }

    /// Delete the selection, or the character at the cursor.
    pub fn delete(&mut self) {
        if let Some(range) = self.selection.take() {
            self.replace_range(range, "");
        } else if self.cursor < self.text.len() {
            let cursor = self.cursor;
            let next = self.text[cursor..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| cursor + i)
                .unwrap_or(self.text.len());
            self.replace_range(cursor..next, "");
            self.cursor = cursor;
        }
    }

    pub fn cursor_left(&mut self) {
        self.selection = None;
        if self.cursor > 0 {
            self.cursor = self.text[..self.cursor].char_indices().last().map(|(i, _)| i).unwrap_or(0);
        }
    }

    pub fn cursor_right(&mut self) {
        self.selection = None;
        if self.cursor < self.text.len() {
            self.cursor = self.text[self.cursor..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| self.cursor + i)
                .unwrap_or(self.text.len());
        }
    }

    pub fn cursor_home(&mut self) {
        self.selection = None;
        self.cursor = self.line_range_at(self.cursor).start;
    }

    pub fn cursor_end(&mut self) {
        self.selection = None;
        self.cursor = self.line_range_at(self.cursor).end;
    }

    /// Byte range of the line containing `pos`, without its newline.
    pub fn line_range_at(&self, pos: usize) -> Range<usize> {
        let pos = pos.min(self.text.len());
        let start = self.text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let end = self.text[pos..].find('\n').map(|i| pos + i).unwrap_or(self.text.len());
        start..end
    }

    /// (line, column) of the cursor, both 0-indexed; column in bytes.
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let line = before.matches('\n').count();
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        (line, self.cursor - line_start)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_cursor() {
        let mut buf = EditorBuffer::new();
        buf.insert("hello");
        assert_eq!(buf.text(), "hello");
        assert_eq!(buf.cursor(), 5);

        buf.insert(" world");
        assert_eq!(buf.text(), "hello world");
        assert_eq!(buf.cursor(), 11);
    }

    #[test]
    fn test_insert_normalizes_newlines() {
        let mut buf = EditorBuffer::new();
        buf.insert("a\r\nb\rc");
        assert_eq!(buf.text(), "a\nb\nc");
    }

    #[test]
    fn test_insert_replaces_selection() {
        let mut buf = EditorBuffer::with_text("local x = 1");
        buf.select(6..7);
        assert_eq!(buf.selected_text(), "x");
        buf.insert("total");
        assert_eq!(buf.text(), "local total = 1");
        assert_eq!(buf.selection(), None);
    }

    #[test]
    fn test_backspace_and_delete() {
        let mut buf = EditorBuffer::with_text("abc");
        buf.backspace();
        assert_eq!(buf.text(), "ab");
        assert_eq!(buf.cursor(), 2);

        buf.set_cursor(0);
        buf.backspace();
        assert_eq!(buf.text(), "ab");

        buf.delete();
        assert_eq!(buf.text(), "b");
        assert_eq!(buf.cursor(), 0);

        buf.set_cursor(1);
        buf.delete();
        assert_eq!(buf.text(), "b");
    }

    #[test]
    fn test_multibyte_cursor_movement() {
        let mut buf = EditorBuffer::with_text("héllo");
        buf.cursor_left();
        buf.cursor_left();
        buf.cursor_left();
        buf.cursor_left();
        assert_eq!(buf.cursor(), 1);
        buf.cursor_right();
        assert_eq!(buf.cursor(), 3);
        buf.set_cursor(2);
        assert_eq!(buf.cursor(), 1);
    }

    #[test]
    fn test_line_ranges() {
        let mut buf = EditorBuffer::with_text("line1\nline2\nline3");
        buf.set_cursor(8);
        assert_eq!(buf.line_range_at(buf.cursor()), 6..11);
        assert_eq!(buf.cursor_line_col(), (1, 2));

        buf.cursor_home();
        assert_eq!(buf.cursor(), 6);
        buf.cursor_end();
        assert_eq!(buf.cursor(), 11);
    }

    #[test]
    fn test_revision_tracks_mutations_only() {
        let mut buf = EditorBuffer::with_text("x");
        let rev = buf.revision();
        buf.cursor_left();
        buf.select(0..1);
        assert_eq!(buf.revision(), rev);
        buf.insert("y");
        assert_eq!(buf.revision(), rev + 1);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(EditorBuffer::new().id(), EditorBuffer::new().id());
    }
}
