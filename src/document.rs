//! # Document Module
//!
//! Line-oriented pass over a plain-text document of definitions. Each
//! non-comment line is fed to the namespace; an `=` after a definition
//! marks a print section whose old content is replaced, on output, by the
//! freshly evaluated value. Everything else — layout, comments, the
//! definitions themselves — passes through verbatim, so a document can be
//! rewritten in place.
//!
//! A failing line is reported with its line number and processing resumes
//! on the next line.

use crate::error::{ErrorKind, ReckonError};
use crate::namespace::{Namespace, VarRef};

use memchr::{memchr, memchr2, memchr_iter};
use std::fmt;
use std::io;

// -----------------------------------------------------------------------------
// PIECES
// -----------------------------------------------------------------------------

/// A unit of output: verbatim text or a value to print.
enum Piece<'s> {
    Slice(&'s str),
    Print(VarRef),
}

// -----------------------------------------------------------------------------
// DIAGNOSTICS
// -----------------------------------------------------------------------------

/// A per-line failure collected during the document pass.
pub struct DocError {
    /// 1-based line where the failing definition starts.
    pub line: u32,
    pub error: ReckonError,
    /// Redefined name or dependency chain, when applicable.
    pub detail: Option<String>,
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(line {}) {}", self.line, self.error.kind.describe())?;
        if let Some(detail) = &self.detail {
            match self.error.kind {
                ErrorKind::Redef => write!(f, "\n    redefinition of \"{}\"", detail)?,
                ErrorKind::CircularDependency => {
                    write!(f, "\n    dependency chain: {}", detail)?
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn detail_for(ns: &Namespace, error: &ReckonError) -> Option<String> {
    let mut buf = String::new();
    match error.kind {
        ErrorKind::Redef => ns.format_redef(&mut buf),
        ErrorKind::CircularDependency => ns.format_cycle(&mut buf),
        _ => return None,
    };
    Some(buf)
}

// -----------------------------------------------------------------------------
// DOCUMENT
// -----------------------------------------------------------------------------

/// A parsed document, ready to be rendered with evaluated print sections.
pub struct Document<'s> {
    pieces: Vec<Piece<'s>>,
}

impl<'s> Document<'s> {
    /// Runs the document pass, defining every line into `ns`.
    ///
    /// Returns the document and the per-line failures; a failing line is
    /// skipped up to its next newline.
    pub fn parse(src: &'s str, ns: &mut Namespace) -> (Document<'s>, Vec<DocError>) {
        let bytes = src.as_bytes();
        let mut pieces: Vec<Piece<'s>> = Vec::new();
        let mut errors: Vec<DocError> = Vec::new();

        let mut pos = 0;
        // Start of the next verbatim slice.
        let mut tail = 0;
        let mut line: u32 = 1;

        // Advances past the current line's newline, if any.
        let next_line = |from: usize, line: &mut u32| -> usize {
            match memchr(b'\n', &bytes[from..]) {
                Some(i) => {
                    *line += 1;
                    from + i + 1
                }
                None => bytes.len(),
            }
        };

        while pos < bytes.len() {
            let start = skip_blank(bytes, pos);
            if start >= bytes.len() {
                break;
            }
            // Blank lines and comment lines pass straight through.
            if bytes[start] == b'\n' || bytes[start] == b'#' {
                pos = next_line(start, &mut line);
                continue;
            }

            let (consumed, result) = ns.define(&src[start..]);
            let var = match result {
                Ok(var) => var,
                Err(error) => {
                    errors.push(DocError {
                        line,
                        detail: detail_for(ns, &error),
                        error,
                    });
                    pos = next_line(start, &mut line);
                    continue;
                }
            };
            line += memchr_iter(b'\n', &bytes[start..start + consumed]).count() as u32;
            pos = start + consumed;

            let after = skip_blank(bytes, pos);
            if after < bytes.len() && bytes[after] == b'=' {
                // Keep everything up to and including the '='; the old
                // print section is dropped in favor of the variable.
                pieces.push(Piece::Slice(&src[tail..after + 1]));
                let stop = match memchr2(b'\n', b'#', &bytes[after + 1..]) {
                    Some(i) => after + 1 + i,
                    None => bytes.len(),
                };
                pieces.push(Piece::Print(var));
                tail = stop;
                pos = next_line(stop, &mut line);
            } else if after < bytes.len() && bytes[after] != b'\n' && bytes[after] != b'#' {
                errors.push(DocError {
                    line,
                    error: ErrorKind::ExtraContent.at(after),
                    detail: None,
                });
                pos = next_line(after, &mut line);
            } else {
                pos = next_line(after, &mut line);
            }
        }
        pieces.push(Piece::Slice(&src[tail..]));

        (Document { pieces }, errors)
    }

    /// Writes the rewritten document, evaluating every print section.
    ///
    /// Failed evaluations appear as `ERR <code>`; the number of failures is
    /// returned.
    pub fn render(&self, out: &mut dyn io::Write) -> io::Result<usize> {
        let mut failures = 0;
        for piece in &self.pieces {
            match piece {
                Piece::Slice(text) => out.write_all(text.as_bytes())?,
                Piece::Print(var) => {
                    if var.value().is_err() {
                        failures += 1;
                    }
                    out.write_all(b" ")?;
                    var.print(out)?;
                    out.write_all(b" ")?;
                }
            }
        }
        Ok(failures)
    }
}

fn skip_blank(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }
    pos
}
