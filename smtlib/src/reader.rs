// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Incrementally read s-expressions from a solver's output stream.
//!
//! Solvers print one s-expression per reply, possibly spread over many lines
//! (models, derivations) or with several short replies sharing a line. The
//! [`SexpReader`] buffers input line by line and hands out each top-level
//! s-expression as soon as it is complete, blocking on the underlying reader
//! otherwise.

use std::{
    borrow::Cow,
    io::{self, BufRead},
};

use thiserror::Error;

use crate::sexp::{self, Sexp};

/// Failure to read a reply.
#[derive(Error, Debug)]
pub enum ReadError {
    /// I/O went wrong
    #[error("could not read from solver: {0}")]
    Io(#[from] io::Error),
    /// The reply was not a well-formed s-expression
    #[error("malformed reply from solver: {text}: {msg}")]
    Parse {
        /// The offending text
        text: String,
        /// The parser's complaint
        msg: String,
    },
    /// A line was not valid UTF-8; it is read on with `?` for each bad
    /// sequence
    #[error("solver output is not valid UTF-8: {0}")]
    Encoding(String),
}

/// A lazy sequence of the s-expressions in a stream.
#[derive(Debug)]
pub struct SexpReader<R> {
    input: R,
    pending: String,
    eof: bool,
}

/// Result of looking for the first complete s-expression in a buffer.
#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// The buffer holds only whitespace and comments.
    Blank,
    /// More input is needed.
    Incomplete,
    /// `buf[start..end]` is the first complete s-expression.
    Complete { start: usize, end: usize },
}

/// Skip a `;` comment starting at `i`; `None` if its line isn't finished yet.
fn skip_comment(bytes: &[u8], i: usize) -> Option<usize> {
    bytes[i..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|offset| i + offset + 1)
}

/// Find the end of a quoted atom starting at `i` with delimiter `q`.
fn skip_quoted(bytes: &[u8], i: usize, q: u8) -> Option<usize> {
    let mut j = i + 1;
    while j < bytes.len() {
        if bytes[j] == q {
            // SMT-LIB escapes a double quote inside a string by doubling it
            if q == b'"' && j + 1 < bytes.len() && bytes[j + 1] == b'"' {
                j += 2;
                continue;
            }
            return Some(j + 1);
        }
        j += 1;
    }
    None
}

fn scan(buf: &str) -> Scan {
    let bytes = buf.as_bytes();
    let mut i = 0;
    // leading whitespace and comments
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == bytes.len() {
            return Scan::Blank;
        }
        if bytes[i] != b';' {
            break;
        }
        match skip_comment(bytes, i) {
            Some(next) => i = next,
            None => return Scan::Incomplete,
        }
    }
    let start = i;
    match bytes[i] {
        b'(' => {
            let mut depth = 0usize;
            while i < bytes.len() {
                match bytes[i] {
                    b'(' => {
                        depth += 1;
                        i += 1;
                    }
                    b')' => {
                        depth -= 1;
                        i += 1;
                        if depth == 0 {
                            return Scan::Complete { start, end: i };
                        }
                    }
                    q @ (b'"' | b'|') => match skip_quoted(bytes, i, q) {
                        Some(next) => i = next,
                        None => return Scan::Incomplete,
                    },
                    b';' => match skip_comment(bytes, i) {
                        Some(next) => i = next,
                        None => return Scan::Incomplete,
                    },
                    _ => i += 1,
                }
            }
            Scan::Incomplete
        }
        // a stray close paren is handed to the parser, which reports it
        b')' => Scan::Complete { start, end: i + 1 },
        q @ (b'"' | b'|') => match skip_quoted(bytes, i, q) {
            Some(end) => Scan::Complete { start, end },
            None => Scan::Incomplete,
        },
        _ => {
            while i < bytes.len() {
                let b = bytes[i];
                if b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'"' | b';') {
                    return Scan::Complete { start, end: i };
                }
                i += 1;
            }
            Scan::Incomplete
        }
    }
}

impl<R: BufRead> SexpReader<R> {
    /// Read s-expressions from `input`.
    pub fn new(input: R) -> Self {
        Self {
            input,
            pending: String::new(),
            eof: false,
        }
    }

    /// Whether the underlying stream has been exhausted.
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    fn parse_text(text: &str) -> Result<Sexp, ReadError> {
        sexp::parse(text)
            .map(Sexp::strip_comments)
            .map_err(|err| ReadError::Parse {
                text: text.to_string(),
                msg: err.to_string(),
            })
    }
}

impl<R: BufRead> Iterator for SexpReader<R> {
    type Item = Result<Sexp, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match scan(&self.pending) {
                Scan::Complete { start, end } => {
                    let text = self.pending[start..end].to_string();
                    self.pending.drain(..end);
                    return Some(Self::parse_text(&text));
                }
                Scan::Blank if self.eof => {
                    self.pending.clear();
                    return None;
                }
                Scan::Incomplete if self.eof => {
                    // whatever is left is all we will ever get
                    let text = std::mem::take(&mut self.pending);
                    return Some(Self::parse_text(text.trim()));
                }
                Scan::Blank | Scan::Incomplete => {}
            }
            let mut line = vec![];
            match self.input.read_until(b'\n', &mut line) {
                Ok(0) => self.eof = true,
                Ok(_) => match String::from_utf8_lossy(&line) {
                    Cow::Borrowed(text) => self.pending.push_str(text),
                    Cow::Owned(text) => {
                        let text = text.replace(char::REPLACEMENT_CHARACTER, "?");
                        self.pending.push_str(&text);
                        return Some(Err(ReadError::Encoding(text.trim_end().to_string())));
                    }
                },
                Err(err) => {
                    self.eof = true;
                    return Some(Err(ReadError::from(err)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{scan, Scan, SexpReader};
    use crate::sexp::{atom_i, atom_s, parse};
    use std::io::Cursor;

    fn read_all(s: &str) -> Vec<String> {
        SexpReader::new(Cursor::new(s.to_string()))
            .map(|r| match r {
                Ok(s) => s.to_string(),
                Err(err) => format!("error: {err}"),
            })
            .collect()
    }

    #[test_log::test]
    fn test_scan() {
        assert_eq!(scan("  \n"), Scan::Blank);
        assert_eq!(scan("; note\n"), Scan::Blank);
        assert_eq!(scan("; note"), Scan::Incomplete);
        assert_eq!(scan("(a (b"), Scan::Incomplete);
        assert_eq!(scan("sat\n"), Scan::Complete { start: 0, end: 3 });
        assert_eq!(scan("sat"), Scan::Incomplete);
        assert_eq!(scan(" (a \")\" b) c"), Scan::Complete { start: 1, end: 10 });
        assert_eq!(scan("(a |)| ; )\n)"), Scan::Complete { start: 0, end: 12 });
    }

    #[test_log::test]
    fn test_multiline_and_shared_lines() {
        let out = "unsat sat\n(model\n  (define-fun x () Int\n    3)\n)\n<<DONE>>\n";
        insta::assert_debug_snapshot!(read_all(out), @r###"
        [
            "unsat",
            "sat",
            "(model (define-fun x () Int 3))",
            "<<DONE>>",
        ]
        "###);
    }

    #[test_log::test]
    fn test_comments_are_dropped() {
        let out = "; leading\n(a ; inner\n b)\n";
        let mut reader = SexpReader::new(Cursor::new(out.to_string()));
        let e = reader.next().unwrap().unwrap();
        assert_eq!(e, parse("(a b)").unwrap());
        assert!(reader.next().is_none());
        assert!(reader.at_eof());
    }

    #[test_log::test]
    fn test_last_atom_without_newline() {
        let mut reader = SexpReader::new(Cursor::new("12".to_string()));
        assert_eq!(reader.next().unwrap().unwrap(), atom_i(12));
        assert!(reader.next().is_none());

        let mut reader = SexpReader::new(Cursor::new("\"<<DONE>>\"\n".to_string()));
        assert_eq!(reader.next().unwrap().unwrap(), atom_s("<<DONE>>"));
    }

    #[test_log::test]
    fn test_truncated_reply_is_an_error() {
        let out = read_all("(model (define-fun x () Int");
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("error: malformed reply from solver"));
    }

    #[test_log::test]
    fn test_invalid_utf8_is_replaced() {
        let out = b"(a \xff)\nsat\n".to_vec();
        let replies = SexpReader::new(Cursor::new(out))
            .map(|r| match r {
                Ok(s) => s.to_string(),
                Err(err) => format!("error: {err}"),
            })
            .collect::<Vec<_>>();
        insta::assert_debug_snapshot!(replies, @r###"
        [
            "error: solver output is not valid UTF-8: (a ?)",
            "(a ?)",
            "sat",
        ]
        "###);
    }

    #[test_log::test]
    fn test_empty_stream() {
        assert!(read_all("").is_empty());
        assert!(read_all("\n\n").is_empty());
    }
}
