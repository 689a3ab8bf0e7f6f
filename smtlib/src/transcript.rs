// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Record the SMT-LIB sent to a solver in a file for debugging purposes.
//!
//! Multi-line commands are written with CRLF line endings, so the transcript of
//! a session reads the same regardless of which platform produced the text.

use std::{
    fs::OpenOptions,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Normalize the line endings of a multi-line command to CRLF.
///
/// Single-line commands are returned unchanged.
pub fn sanitize(cmd: &str) -> String {
    match cmd.find('\n') {
        Some(idx) if idx > 0 => cmd.replace('\r', "").replace('\n', "\r\n"),
        _ => cmd.to_string(),
    }
}

/// An open transcript file.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    out: BufWriter<std::fs::File>,
}

impl Transcript {
    /// Create (or truncate) the transcript at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        log::debug!("writing transcript to {}", path.display());
        Ok(Self {
            path,
            out: BufWriter::new(f),
        })
    }

    /// Where this transcript is written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one command that was sent to the solver.
    pub fn command(&mut self, cmd: &str) -> io::Result<()> {
        write!(self.out, "{}\r\n", sanitize(cmd))
    }

    /// Record text that is already normalized, such as a replayed prelude.
    pub fn raw(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())
    }

    /// Push buffered text out to the file.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Drop for Transcript {
    fn drop(&mut self) {
        _ = self.out.flush();
    }
}
