use std::io::{ErrorKind, Read};
use std::time::Duration;

use tracing::warn;

use crate::error::SourceError;

const CHUNK_SIZE_BYTES: usize = 4096;

/// Longest line kept by [`ReaderLineSource`] unless configured otherwise.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SourceLine {
    /// One complete line, terminator removed.
    Line(String),
    /// Nothing arrived within the read timeout.
    Empty,
    /// The source has no more data.
    End,
}

/// A blocking producer of raw lines, read by exactly one capture session.
pub trait LineSource {
    /// Waits at most about `timeout` for the next line.
    fn next_line(&mut self, timeout: Duration) -> Result<SourceLine, SourceError>;

    /// Lines dropped so far for exceeding the source's length limit.
    fn oversized_lines(&self) -> u64 {
        0
    }

    fn close(&mut self) {}
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn next_line(&mut self, timeout: Duration) -> Result<SourceLine, SourceError> {
        (**self).next_line(timeout)
    }

    fn oversized_lines(&self) -> u64 {
        (**self).oversized_lines()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Splits any byte stream into newline-normalized lines.
///
/// `\n`, `\r\n` and a lone `\r` each end a line. Invalid UTF-8 is replaced rather than
/// rejected. A read that times out surfaces as [`SourceLine::Empty`] and keeps any
/// partial line for the next call, so a slow device never produces split lines.
/// The read timeout itself belongs to the wrapped reader; reach it through
/// [`ReaderLineSource::get_mut`].
pub struct ReaderLineSource<R: Read> {
    reader: R,
    max_line_bytes: usize,
    buffer: [u8; CHUNK_SIZE_BYTES],
    buffer_pos: usize,
    buffer_len: usize,
    current_line: Vec<u8>,
    observed_bytes: usize,
    discard_mode: bool,
    skip_lf: bool,
    done: bool,
    oversized: u64,
}

impl<R: Read> ReaderLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line_bytes(reader, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes: max_line_bytes.max(1),
            buffer: [0u8; CHUNK_SIZE_BYTES],
            buffer_pos: 0,
            buffer_len: 0,
            current_line: Vec::new(),
            observed_bytes: 0,
            discard_mode: false,
            skip_lf: false,
            done: false,
            oversized: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    fn finish_line(&mut self) -> Option<String> {
        if self.discard_mode {
            self.oversized += 1;
            warn!(
                observed_bytes = self.observed_bytes,
                max_line_bytes = self.max_line_bytes,
                "discarding oversized line"
            );
            self.reset_line_state();
            return None;
        }

        let line = String::from_utf8_lossy(&self.current_line).into_owned();
        self.reset_line_state();
        Some(line)
    }

    fn reset_line_state(&mut self) {
        self.current_line.clear();
        self.observed_bytes = 0;
        self.discard_mode = false;
    }

    fn observe_bytes(&mut self, additional: usize) {
        self.observed_bytes = self.observed_bytes.saturating_add(additional);
        if self.observed_bytes > self.max_line_bytes && !self.discard_mode {
            self.discard_mode = true;
            self.current_line.clear();
        }
    }

    fn at_end_of_input(&mut self) -> SourceLine {
        self.done = true;
        if self.discard_mode || !self.current_line.is_empty() {
            if let Some(line) = self.finish_line() {
                return SourceLine::Line(line);
            }
        }
        SourceLine::End
    }
}

impl<R: Read> LineSource for ReaderLineSource<R> {
    fn next_line(&mut self, _timeout: Duration) -> Result<SourceLine, SourceError> {
        if self.done {
            return Ok(SourceLine::End);
        }

        loop {
            if self.buffer_pos >= self.buffer_len {
                self.buffer_pos = 0;
                self.buffer_len = 0;
                match self.reader.read(&mut self.buffer) {
                    Ok(0) => return Ok(self.at_end_of_input()),
                    Ok(n) => self.buffer_len = n,
                    Err(err)
                        if matches!(
                            err.kind(),
                            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                        ) =>
                    {
                        return Ok(SourceLine::Empty);
                    }
                    Err(err) => {
                        self.done = true;
                        return Err(SourceError::Io(err));
                    }
                }
            }

            if self.skip_lf {
                self.skip_lf = false;
                if self.buffer[self.buffer_pos] == b'\n' {
                    self.buffer_pos += 1;
                    continue;
                }
            }

            let (terminator_idx, slice_len) = {
                let slice = &self.buffer[self.buffer_pos..self.buffer_len];
                (
                    slice.iter().position(|b| matches!(*b, b'\n' | b'\r')),
                    slice.len(),
                )
            };

            let Some(idx) = terminator_idx else {
                self.observe_bytes(slice_len);
                if !self.discard_mode {
                    let slice = &self.buffer[self.buffer_pos..self.buffer_len];
                    self.current_line.extend_from_slice(slice);
                }
                self.buffer_pos = self.buffer_len;
                continue;
            };

            self.observe_bytes(idx);
            if !self.discard_mode {
                let segment = &self.buffer[self.buffer_pos..self.buffer_pos + idx];
                self.current_line.extend_from_slice(segment);
            }
            self.skip_lf = self.buffer[self.buffer_pos + idx] == b'\r';
            self.buffer_pos += idx + 1;

            if let Some(line) = self.finish_line() {
                return Ok(SourceLine::Line(line));
            }
        }
    }

    fn oversized_lines(&self) -> u64 {
        self.oversized
    }
}
