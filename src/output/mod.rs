use std::io::{self, Write};
use std::sync::Mutex;

use crate::shared::lock;
use crate::utils;

pub fn format_result_line(url: &str, path: &str, status: u16) -> String {
    format!("{}, {}, {}\n", url, utils::display_path(path), status)
}

/// Serialized writer for discovery lines. Every line is written and flushed under one lock so
/// concurrent sessions never interleave partial output.
pub struct ResultSink {
    out: Mutex<Box<dyn Write + Send>>,
    written: Mutex<usize>,
}

impl ResultSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            written: Mutex::new(0),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn write_result(&self, url: &str, path: &str, status: u16) -> io::Result<()> {
        let line = format_result_line(url, path, status);
        let mut out = lock(&self.out);
        out.write_all(line.as_bytes())?;
        out.flush()?;
        *lock(&self.written) += 1;
        Ok(())
    }

    /// Lines successfully written so far.
    pub fn written(&self) -> usize {
        *lock(&self.written)
    }
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink")
            .field("written", &self.written())
            .finish()
    }
}

/// In-memory destination; clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(std::sync::Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(|l| l.to_string()).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
