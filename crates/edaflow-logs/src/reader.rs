//! Line reader with a per-line byte cap.
//!
//! `BufRead::lines` buffers a whole line before returning it, so a single
//! multi-megabyte line (a flattened netlist dump, a progress bar without
//! newlines) would be held in memory at once. [`BoundedLines`] copies at most
//! `max_bytes` of each line and consumes the rest straight from the reader's
//! buffer.

use std::io::{self, BufRead};

/// One line as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based.
    pub number: u64,
    pub text: String,
    pub truncated: bool,
}

pub struct BoundedLines<R> {
    reader: R,
    max_bytes: usize,
    buf: Vec<u8>,
    number: u64,
}

impl<R: BufRead> BoundedLines<R> {
    pub fn new(reader: R, max_bytes: usize) -> Self {
        BoundedLines {
            reader,
            max_bytes,
            buf: Vec::new(),
            number: 0,
        }
    }

    /// Reads the next line, or `None` at end of input.
    pub fn next_line(&mut self) -> io::Result<Option<Line>> {
        self.buf.clear();
        let mut truncated = false;
        let mut read_any = false;

        loop {
            let available = match self.reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                if !read_any {
                    return Ok(None);
                }
                break;
            }
            read_any = true;

            let (chunk_len, consumed, end_of_line) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i, i + 1, true),
                None => (available.len(), available.len(), false),
            };
            let room = self.max_bytes.saturating_sub(self.buf.len());
            if chunk_len > room {
                truncated = true;
            }
            self.buf.extend_from_slice(&available[..chunk_len.min(room)]);
            self.reader.consume(consumed);
            if end_of_line {
                break;
            }
        }

        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        self.number += 1;
        Ok(Some(Line {
            number: self.number,
            text: String::from_utf8_lossy(&self.buf).into_owned(),
            truncated,
        }))
    }
}

impl<R: BufRead> Iterator for BoundedLines<R> {
    type Item = io::Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
