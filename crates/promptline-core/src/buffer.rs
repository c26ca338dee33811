//! Session output buffering.
//!
//! The buffer is an append-only transcript of everything the child wrote, plus
//! a cursor separating text already handed to a caller from text that has not
//! been returned yet. Nothing is ever evicted or rewritten; only the cursor
//! moves, and only forward.

/// Append-only text accumulator with a consumable cursor.
///
/// Not synchronized on its own; a `Session` keeps it behind the same lock as
/// the lifecycle state.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
    cursor: usize,
    frozen: bool,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded output. Returns `false` once the buffer is frozen.
    pub fn append(&mut self, chunk: &str) -> bool {
        if self.frozen {
            return false;
        }
        self.text.push_str(chunk);
        true
    }

    /// Stop accepting appends. Called when the session reaches a terminal state.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Text not yet returned to a caller.
    pub fn unconsumed(&self) -> &str {
        &self.text[self.cursor..]
    }

    pub fn unconsumed_len(&self) -> usize {
        self.text.len() - self.cursor
    }

    /// Return the unconsumed text up to `offset` bytes past the cursor and
    /// advance the cursor over it.
    pub fn consume(&mut self, offset: usize) -> String {
        let end = (self.cursor + offset).min(self.text.len());
        let taken = self.text[self.cursor..end].to_string();
        self.cursor = end;
        taken
    }

    /// Return and consume everything after the cursor.
    pub fn consume_all(&mut self) -> String {
        self.consume(self.unconsumed_len())
    }

    /// Move the cursor to the end without returning anything.
    pub fn skip_to_end(&mut self) -> usize {
        let skipped = self.unconsumed_len();
        self.cursor = self.text.len();
        skipped
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whole transcript, including consumed text.
    pub fn contents(&self) -> &str {
        &self.text
    }
}
