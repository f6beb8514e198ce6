use super::SwapSource;
use crate::errors::Result;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Tails a newline-delimited JSON file the decoder appends to.
///
/// Each poll reads from the byte offset where the previous one stopped and
/// consumes only complete lines; a trailing line still being written is left
/// for the next poll. If the file shrinks below the offset it was rotated or
/// truncated, and reading restarts from the top.
#[derive(Debug, Clone)]
pub struct JsonlInbox {
    path: PathBuf,
    offset: u64,
}

impl JsonlInbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    fn read_tail(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "[INGEST] inbox not created yet");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len < self.offset {
            warn!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "[INGEST] inbox shrank, rereading from the start"
            );
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }
}

impl SwapSource for JsonlInbox {
    fn fetch_batch(&mut self) -> Result<Vec<serde_json::Value>> {
        let Some(buf) = self.read_tail()? else {
            return Ok(Vec::new());
        };
        let Some(end) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };

        let mut batch = Vec::new();
        for (n, line) in buf[..end].split(|&b| b == b'\n').enumerate() {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<serde_json::Value>(line) {
                Ok(value) => batch.push(value),
                Err(e) => {
                    warn!(
                        offset = self.offset,
                        line = n + 1,
                        error = %e,
                        "[INGEST] skipping malformed JSONL line"
                    );
                }
            }
        }
        self.offset += end as u64 + 1;
        Ok(batch)
    }

    fn cursor(&self) -> u64 {
        self.offset
    }

    fn resume_from(&mut self, cursor: u64) {
        self.offset = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn append(path: &std::path::Path, text: &str) {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn missing_inbox_yields_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbox = JsonlInbox::new(dir.path().join("inbox.jsonl"));
        assert!(inbox.fetch_batch().unwrap().is_empty());
        assert_eq!(inbox.cursor(), 0);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        fs::write(&path, "{\"a\":1}\n\nnot json\n{\"b\":2}\n").unwrap();
        let mut inbox = JsonlInbox::new(&path);
        let batch = inbox.fetch_batch().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1]["b"], 2);
    }

    #[test]
    fn each_line_is_handed_out_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        append(&path, "{\"n\":1}\n{\"n\":2}\n");
        let mut inbox = JsonlInbox::new(&path);
        assert_eq!(inbox.fetch_batch().unwrap().len(), 2);
        assert!(inbox.fetch_batch().unwrap().is_empty());

        append(&path, "{\"n\":3}\n");
        let batch = inbox.fetch_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["n"], 3);
    }

    #[test]
    fn partial_trailing_line_waits_for_its_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        append(&path, "{\"n\":1}\n{\"n\":");
        let mut inbox = JsonlInbox::new(&path);
        assert_eq!(inbox.fetch_batch().unwrap().len(), 1);
        assert_eq!(inbox.cursor(), 8);

        append(&path, "2}\n");
        let batch = inbox.fetch_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["n"], 2);
    }

    #[test]
    fn resumed_cursor_skips_consumed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        append(&path, "{\"n\":1}\n{\"n\":2}\n");
        let mut first = JsonlInbox::new(&path);
        first.fetch_batch().unwrap();

        append(&path, "{\"n\":3}\n");
        let mut second = JsonlInbox::new(&path);
        second.resume_from(first.cursor());
        let batch = second.fetch_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["n"], 3);
    }

    #[test]
    fn truncated_inbox_is_reread_from_the_top() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        append(&path, "{\"n\":1}\n{\"n\":2}\n");
        let mut inbox = JsonlInbox::new(&path);
        inbox.fetch_batch().unwrap();

        fs::write(&path, "{\"n\":9}\n").unwrap();
        let batch = inbox.fetch_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["n"], 9);
    }
}
