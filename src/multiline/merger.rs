use tokio::sync::mpsc;

use super::detector::Detector;
use crate::error::LappError;
use crate::source::ReadResult;

/// One logical log entry, possibly spanning multiple physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    /// 1-based physical line number of the first line.
    pub start_line: u64,
    /// 1-based physical line number of the last line (inclusive).
    pub end_line: u64,
    /// Physical lines joined by `\n`.
    pub content: String,
}

/// Result of one merge step: a logical entry, or the terminal error of the
/// input stream.
pub type MergeResult = Result<MergedEntry, LappError>;

/// Channel capacity between the merger task and its consumer.
const CHANNEL_CAPACITY: usize = 100;

/// Shared merge state machine. Both delivery modes (stream and slice) drive
/// this so they produce identical results for the same input.
struct MergeState {
    buf: Vec<String>,
    start_line: u64,
    end_line: u64,
    buf_bytes: usize,
    ever_detected: bool,
    max_entry_bytes: usize,
}

impl MergeState {
    fn new(max_entry_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            start_line: 0,
            end_line: 0,
            buf_bytes: 0,
            ever_detected: false,
            max_entry_bytes,
        }
    }

    /// Feed one physical line; returns the entry flushed by this line, if
    /// any. At most one entry is emitted per line since every flush empties
    /// the buffer.
    fn push(&mut self, is_new: bool, line_number: u64, content: String) -> Option<MergedEntry> {
        if is_new {
            self.ever_detected = true;
        }

        let mut flushed = None;

        // While no timestamp has ever been seen, fall back to line-by-line.
        if !self.ever_detected && !self.buf.is_empty() {
            flushed = self.flush();
        }

        if is_new && !self.buf.is_empty() {
            flushed = self.flush();
        }

        // Check overflow before updating end_line so the flush uses the
        // correct range. +1 accounts for the joining newline.
        let mut new_size = self.buf_bytes + content.len();
        if !self.buf.is_empty() {
            new_size += 1;
        }
        if new_size > self.max_entry_bytes && !self.buf.is_empty() {
            flushed = self.flush();
        }

        if self.buf.is_empty() {
            self.start_line = line_number;
            self.buf_bytes = content.len();
        } else {
            self.buf_bytes = new_size;
        }
        self.end_line = line_number;
        self.buf.push(content);

        flushed
    }

    fn flush(&mut self) -> Option<MergedEntry> {
        if self.buf.is_empty() {
            return None;
        }
        let entry = MergedEntry {
            start_line: self.start_line,
            end_line: self.end_line,
            content: self.buf.join("\n"),
        };
        self.buf.clear();
        self.buf_bytes = 0;
        Some(entry)
    }
}

/// Merge a stream of physical lines into logical entries on a dedicated
/// task. Read errors from the input are propagated as the terminal element;
/// any buffered remainder is flushed when the input ends.
pub fn merge_stream(
    mut input: mpsc::Receiver<ReadResult>,
    detector: Detector,
) -> mpsc::Receiver<MergeResult> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut state = MergeState::new(detector.max_entry_bytes());

        while let Some(result) = input.recv().await {
            match result {
                Ok(line) => {
                    let is_new = detector.is_new_entry(&line.content);
                    if let Some(entry) = state.push(is_new, line.line_number, line.content) {
                        if tx.send(Ok(entry)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }

        if let Some(entry) = state.flush() {
            let _ = tx.send(Ok(entry)).await;
        }
    });

    rx
}

/// Merge a slice of physical lines into logical entries. Line numbers start
/// at 1. Used by non-streaming callers; produces the same entries as
/// [`merge_stream`] for the same input.
pub fn merge_slice(lines: &[String], detector: &Detector) -> Vec<MergedEntry> {
    let mut state = MergeState::new(detector.max_entry_bytes());
    let mut result = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let is_new = detector.is_new_entry(line);
        if let Some(entry) = state.push(is_new, (i + 1) as u64, line.clone()) {
            result.push(entry);
        }
    }
    if let Some(entry) = state.flush() {
        result.push(entry);
    }

    result
}
