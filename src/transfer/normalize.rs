//! CRLF to LF normalization over an arbitrarily chunked byte stream.

use std::io::{self, Write};

/// The one-bit state machine: a carriage return seen but not yet resolved.
///
/// State survives across calls, so a CRLF pair split over two writes still
/// collapses to a single LF. Zero-length input is a no-op and does not
/// disturb the pending state.
#[derive(Debug, Default)]
pub(crate) struct CrLfNormalizer {
    pending_cr: bool,
}

impl CrLfNormalizer {
    pub(crate) fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    out.push(b'\n');
                    continue;
                }
                out.push(b'\r');
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(byte);
            }
        }
    }

    /// Flushes a trailing unresolved CR. Called at end of stream.
    pub(crate) fn finish(&mut self, out: &mut Vec<u8>) {
        if self.pending_cr {
            self.pending_cr = false;
            out.push(b'\r');
        }
    }

    pub(crate) fn pending(&self) -> bool {
        self.pending_cr
    }
}

/// Writer adapter guaranteeing the inner sink never sees a bare CR that is
/// immediately followed by an LF: every CRLF collapses to LF, lone CRs pass
/// through once it is known no LF follows.
pub struct NormalizeCrLf<W: Write> {
    inner: W,
    state: CrLfNormalizer,
    scratch: Vec<u8>,
}

impl<W: Write> NormalizeCrLf<W> {
    pub fn new(inner: W) -> Self {
        NormalizeCrLf {
            inner,
            state: CrLfNormalizer::default(),
            scratch: Vec::new(),
        }
    }

    /// Whether a CR is being held back waiting for the next byte.
    pub fn pending(&self) -> bool {
        self.state.pending()
    }

    /// Flushes a trailing CR, if any, and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.scratch.clear();
        self.state.finish(&mut self.scratch);
        if !self.scratch.is_empty() {
            self.inner.write_all(&self.scratch)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for NormalizeCrLf<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.scratch.clear();
        self.state.feed(buf, &mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
