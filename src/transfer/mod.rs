//! Client-side bulk transfers.
//!
//! During a `COPY ... ON CLIENT` statement the server turns the protocol
//! around and asks the client to produce or consume a file. The
//! [`TransferCoordinator`] reads that request, dispatches it to a registered
//! [`UploadHandler`] or [`DownloadHandler`], and settles the outcome:
//! completed, refused by the handler, or cancelled by the peer.
//!
//! A handler that fails mid-stream leaves the byte protocol in an unknown
//! state, so the coordinator poisons the connection rather than guess.

mod charset;
mod normalize;

pub use charset::Charset;
pub use normalize::NormalizeCrLf;

use std::io::{self, BufRead, Read, Write};

use tracing::{debug, warn};

use crate::error::TransferError;
use crate::wire::MessageWire;

use self::charset::{latin1_to_utf8, Utf8ToLatin1};
use self::normalize::CrLfNormalizer;

/// Upload data is acknowledged per chunk; a smaller chunk means the peer can
/// cancel earlier at the cost of more round trips.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

const REFUSAL_PREFIX: u8 = b'!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// A parsed transfer request line.
///
/// The server sends one of four forms: `r <offset> <name>` (text upload),
/// `rb <name>` (binary upload), `w <name>` (text download), `wb <name>`
/// (binary download).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub direction: Direction,
    pub name: String,
    pub text_mode: bool,
    /// 1-based starting line for text uploads. 0 and 1 both mean the whole
    /// file; n > 1 skips the first n - 1 lines.
    pub offset: u64,
}

impl TransferRequest {
    pub fn parse(line: &str) -> Result<TransferRequest, TransferError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let malformed = || TransferError::MalformedRequest(line.to_string());
        let (command, rest) = line.split_once(' ').ok_or_else(malformed)?;
        let (direction, text_mode, offset, name) = match command {
            "r" => {
                let (offset, name) = rest.split_once(' ').ok_or_else(malformed)?;
                let offset = offset.parse().map_err(|_| malformed())?;
                (Direction::Upload, true, offset, name)
            }
            "rb" => (Direction::Upload, false, 0, rest),
            "w" => (Direction::Download, true, 0, rest),
            "wb" => (Direction::Download, false, 0, rest),
            _ => return Err(malformed()),
        };
        if name.is_empty() {
            return Err(malformed());
        }
        Ok(TransferRequest {
            direction,
            name: name.to_string(),
            text_mode,
            offset,
        })
    }

    /// Lines the handler must not send, per the offset convention above.
    pub fn lines_to_skip(&self) -> u64 {
        self.offset.saturating_sub(1)
    }
}

/// How a dispatched transfer ended. Only `Failed` is an error; it is
/// reported through [`TransferError`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    /// The handler declined; the message was forwarded to the server and
    /// the connection stays usable.
    Refused(String),
    /// The peer stopped reading a long upload early. The rows it did accept
    /// are in; this is a truncation, not an error.
    Cancelled,
}

/// Produces upload data on request. Either stream data into `upload` or
/// call [`Upload::send_error`], never both.
pub trait UploadHandler {
    fn handle_upload(
        &mut self,
        upload: &mut Upload<'_>,
        name: &str,
        text_mode: bool,
        lines_to_skip: u64,
    ) -> io::Result<()>;

    /// Called after the fact when the peer cancelled the upload mid-way.
    fn upload_cancelled(&mut self) {}
}

/// Consumes download data on request. Either read from `download` or call
/// [`Download::send_error`], never both.
pub trait DownloadHandler {
    fn handle_download(
        &mut self,
        download: &mut Download<'_>,
        name: &str,
        text_mode: bool,
    ) -> io::Result<()>;
}

/// Write side of an upload in progress, handed to the [`UploadHandler`].
///
/// Bytes written here are chunked onto the wire; after every chunk the peer
/// acknowledges, and a non-empty acknowledgement cancels the upload. Writes
/// after cancellation are silently swallowed so a handler that does not
/// check [`is_cancelled`](Upload::is_cancelled) still terminates cleanly.
pub struct Upload<'a> {
    wire: &'a mut dyn MessageWire,
    chunk_size: usize,
    bytes_sent: u64,
    cancelled: bool,
    refusal: Option<String>,
    text_mode: bool,
    charset: Charset,
    crlf: CrLfNormalizer,
    scratch: Vec<u8>,
    converted: Vec<u8>,
}

impl<'a> Upload<'a> {
    fn new(wire: &'a mut dyn MessageWire, text_mode: bool) -> Self {
        Upload {
            wire,
            chunk_size: DEFAULT_CHUNK_SIZE,
            bytes_sent: 0,
            cancelled: false,
            refusal: None,
            text_mode,
            charset: Charset::Utf8,
            crlf: CrLfNormalizer::default(),
            scratch: Vec::new(),
            converted: Vec::new(),
        }
    }

    /// Refuses the transfer. Only valid before any data has been written.
    pub fn send_error(&mut self, message: impl Into<String>) -> io::Result<()> {
        if self.has_streamed() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot refuse an upload after data has been sent",
            ));
        }
        self.refusal = Some(message.into());
        Ok(())
    }

    /// Sets the chunk size for the rest of the upload. Values below 1 are
    /// clamped.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Declares the charset the handler writes in. Text mode only, and only
    /// before the first write.
    pub fn set_charset(&mut self, charset: Charset) -> io::Result<()> {
        if !self.text_mode || self.has_streamed() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "charset can only be set on a text upload before writing",
            ));
        }
        self.charset = charset;
        Ok(())
    }

    /// Whether the peer has signalled it wants no more data.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Streams a binary reader to the server.
    pub fn upload_from(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        let mut buf = vec![0u8; 64 * 1024];
        while !self.cancelled {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.raw_write(&buf[..n])?;
        }
        Ok(())
    }

    /// Streams a text reader to the server, skipping `lines_to_skip` leading
    /// lines and applying the text-mode filters to the rest.
    pub fn upload_from_text(
        &mut self,
        reader: &mut dyn BufRead,
        lines_to_skip: u64,
    ) -> io::Result<()> {
        let mut line = Vec::new();
        let mut skipped = 0u64;
        while !self.cancelled {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            if skipped < lines_to_skip {
                skipped += 1;
                continue;
            }
            self.write_all(&line)?;
        }
        Ok(())
    }

    fn has_streamed(&self) -> bool {
        self.bytes_sent > 0 || self.wire.buffered() > 0
    }

    fn raw_write(&mut self, mut data: &[u8]) -> io::Result<()> {
        if self.refusal.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "upload was already refused",
            ));
        }
        loop {
            if self.cancelled {
                return Ok(());
            }
            if self.wire.buffered() >= self.chunk_size {
                self.flush_chunk()?;
                continue;
            }
            if data.is_empty() {
                return Ok(());
            }
            let take = (self.chunk_size - self.wire.buffered()).min(data.len());
            self.wire.put_bytes(&data[..take]);
            self.bytes_sent += take as u64;
            data = &data[take..];
        }
    }

    fn flush_chunk(&mut self) -> io::Result<()> {
        self.wire.end_message()?;
        let ack = self.wire.read_message()?;
        if !ack.is_empty() {
            debug!(
                bytes_sent = self.bytes_sent,
                "peer stopped reading, upload cancelled"
            );
            self.cancelled = true;
        }
        Ok(())
    }

    fn push_text(&mut self, data: &[u8]) -> io::Result<()> {
        if self.charset == Charset::Latin1 {
            let mut converted = std::mem::take(&mut self.converted);
            converted.clear();
            latin1_to_utf8(data, &mut converted);
            let result = self.raw_write(&converted);
            self.converted = converted;
            result
        } else {
            self.raw_write(data)
        }
    }

    /// Ends the data stream: a trailing pending CR, the final partial
    /// chunk, then the zero-length end-of-data message.
    fn close(&mut self) -> io::Result<()> {
        if self.text_mode && !self.cancelled {
            let mut tail = std::mem::take(&mut self.scratch);
            tail.clear();
            self.crlf.finish(&mut tail);
            if !tail.is_empty() {
                self.push_text(&tail)?;
            }
            self.scratch = tail;
        }
        if self.cancelled {
            self.wire.discard_buffered();
        } else if self.wire.buffered() > 0 {
            self.flush_chunk()?;
        }
        self.wire.end_message()
    }
}

impl Write for Upload<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.text_mode {
            self.raw_write(buf)?;
            return Ok(buf.len());
        }
        let mut normalized = std::mem::take(&mut self.scratch);
        normalized.clear();
        self.crlf.feed(buf, &mut normalized);
        let result = self.push_text(&normalized);
        self.scratch = normalized;
        result?;
        Ok(buf.len())
    }

    /// Chunk boundaries are driven by [`set_chunk_size`](Upload::set_chunk_size);
    /// flush is a no-op.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read side of a download in progress, handed to the [`DownloadHandler`].
///
/// The first read accepts the transfer and from then on messages stream in
/// until the zero-length end-of-data marker. In text mode the handler may
/// ask for a different line separator or charset before reading.
pub struct Download<'a> {
    wire: &'a mut dyn MessageWire,
    text_mode: bool,
    charset: Charset,
    line_sep: Vec<u8>,
    started: bool,
    eof: bool,
    refusal: Option<String>,
    buf: Vec<u8>,
    pos: usize,
    latin1: Utf8ToLatin1,
}

impl<'a> Download<'a> {
    fn new(wire: &'a mut dyn MessageWire, text_mode: bool) -> Self {
        Download {
            wire,
            text_mode,
            charset: Charset::Utf8,
            line_sep: b"\n".to_vec(),
            started: false,
            eof: false,
            refusal: None,
            buf: Vec::new(),
            pos: 0,
            latin1: Utf8ToLatin1::default(),
        }
    }

    /// Refuses the transfer. Only valid before the first read.
    pub fn send_error(&mut self, message: impl Into<String>) -> io::Result<()> {
        if self.started {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot refuse a download after reading has started",
            ));
        }
        self.refusal = Some(message.into());
        Ok(())
    }

    /// Replaces the `\n` the wire carries with `separator` in the bytes the
    /// handler reads. Text mode only, before the first read.
    pub fn set_line_separator(&mut self, separator: &str) -> io::Result<()> {
        if !self.text_mode || self.started || separator.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "line separator can only be set on a text download before reading",
            ));
        }
        self.line_sep = separator.as_bytes().to_vec();
        Ok(())
    }

    /// Declares the charset the handler reads in. Text mode only, before the
    /// first read.
    pub fn set_charset(&mut self, charset: Charset) -> io::Result<()> {
        if !self.text_mode || self.started {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "charset can only be set on a text download before reading",
            ));
        }
        self.charset = charset;
        Ok(())
    }

    /// Drains the whole download into `writer`.
    pub fn download_to(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        io::copy(self, writer)?;
        Ok(())
    }

    fn transforms_active(&self) -> bool {
        self.text_mode && (self.line_sep != b"\n" || self.charset != Charset::Utf8)
    }

    fn load_next_message(&mut self) -> io::Result<()> {
        let msg = self.wire.read_message()?;
        if msg.is_empty() {
            self.eof = true;
            if self.charset == Charset::Latin1 {
                self.latin1.finish()?;
            }
            return Ok(());
        }
        self.buf.clear();
        self.pos = 0;
        if !self.transforms_active() {
            self.buf.extend_from_slice(&msg);
            return Ok(());
        }
        let mut rewritten = Vec::with_capacity(msg.len());
        for &byte in msg.iter() {
            if byte == b'\n' {
                rewritten.extend_from_slice(&self.line_sep);
            } else {
                rewritten.push(byte);
            }
        }
        if self.charset == Charset::Latin1 {
            self.latin1.convert(&rewritten, &mut self.buf)
        } else {
            self.buf = rewritten;
            Ok(())
        }
    }

    /// Reads and discards messages until end-of-data, so the connection is
    /// back in sync even when the handler stopped early.
    fn drain(&mut self) -> io::Result<()> {
        while !self.eof {
            if self.wire.read_message()?.is_empty() {
                self.eof = true;
            }
        }
        Ok(())
    }
}

impl Read for Download<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.started {
            if self.refusal.is_some() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "download was already refused",
                ));
            }
            // zero-length message accepts the transfer
            self.started = true;
            self.wire.end_message()?;
        }
        loop {
            let avail = self.buf.len() - self.pos;
            if avail > 0 {
                let n = avail.min(out.len());
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.eof || out.is_empty() {
                return Ok(0);
            }
            self.load_next_message()?;
        }
    }
}

/// Dispatches server transfer requests to registered handlers and settles
/// the protocol exchange around each one.
pub struct TransferCoordinator<'a> {
    wire: &'a mut dyn MessageWire,
}

impl<'a> TransferCoordinator<'a> {
    pub fn new(wire: &'a mut dyn MessageWire) -> Self {
        TransferCoordinator { wire }
    }

    /// Reads the server's request and dispatches it. A request with no
    /// matching handler is refused; the connection stays usable.
    pub fn handle_request(
        &mut self,
        upload_handler: Option<&mut dyn UploadHandler>,
        download_handler: Option<&mut dyn DownloadHandler>,
    ) -> Result<TransferOutcome, TransferError> {
        let msg = self.wire.read_message().map_err(|e| self.fail(e))?;
        let line = std::str::from_utf8(&msg).map_err(|_| {
            self.wire.poison();
            TransferError::MalformedRequest("request is not utf-8".into())
        })?;
        // a request we cannot parse means the protocol is desynchronized
        let request = TransferRequest::parse(line).map_err(|e| {
            self.wire.poison();
            e
        })?;
        match request.direction {
            Direction::Upload => match upload_handler {
                Some(handler) => self.upload(&request, handler),
                None => self.refuse("no upload handler registered"),
            },
            Direction::Download => match download_handler {
                Some(handler) => self.download(&request, handler),
                None => self.refuse("no download handler registered"),
            },
        }
    }

    /// Runs a single upload request against `handler`.
    pub fn upload(
        &mut self,
        request: &TransferRequest,
        handler: &mut dyn UploadHandler,
    ) -> Result<TransferOutcome, TransferError> {
        debug!(
            name = %request.name,
            text = request.text_mode,
            offset = request.offset,
            "upload requested"
        );
        let mut upload = Upload::new(&mut *self.wire, request.text_mode);
        let handled = handler.handle_upload(
            &mut upload,
            &request.name,
            request.text_mode,
            request.lines_to_skip(),
        );
        if let Err(e) = handled {
            warn!(error = %e, "upload handler failed, closing connection");
            return Err(self.fail(e));
        }
        if let Some(message) = upload.refusal.take() {
            return self.refuse(&message);
        }
        if !upload.has_streamed() && !upload.cancelled {
            // the handler neither wrote nor refused
            return self.refuse("handler produced no data");
        }
        let closed = upload.close();
        let cancelled = upload.cancelled;
        let bytes_sent = upload.bytes_sent;
        if let Err(e) = closed {
            return Err(self.fail(e));
        }
        if cancelled {
            debug!(bytes_sent, "upload cancelled by peer");
            handler.upload_cancelled();
            Ok(TransferOutcome::Cancelled)
        } else {
            debug!(bytes_sent, "upload completed");
            Ok(TransferOutcome::Completed)
        }
    }

    /// Runs a single download request against `handler`.
    pub fn download(
        &mut self,
        request: &TransferRequest,
        handler: &mut dyn DownloadHandler,
    ) -> Result<TransferOutcome, TransferError> {
        debug!(name = %request.name, text = request.text_mode, "download requested");
        let mut download = Download::new(&mut *self.wire, request.text_mode);
        let handled = handler.handle_download(&mut download, &request.name, request.text_mode);
        if let Err(e) = handled {
            warn!(error = %e, "download handler failed, closing connection");
            return Err(self.fail(e));
        }
        if let Some(message) = download.refusal.take() {
            return self.refuse(&message);
        }
        if !download.started {
            return self.refuse("handler sent no response");
        }
        let drained = download.drain();
        if let Err(e) = drained {
            return Err(self.fail(e));
        }
        debug!("download completed");
        Ok(TransferOutcome::Completed)
    }

    fn refuse(&mut self, message: &str) -> Result<TransferOutcome, TransferError> {
        self.wire.discard_buffered();
        self.wire.put_bytes(&[REFUSAL_PREFIX]);
        self.wire.put_bytes(message.as_bytes());
        self.wire.put_bytes(b"\n");
        self.wire.end_message().map_err(|e| self.fail(e))?;
        debug!(message, "transfer refused");
        Ok(TransferOutcome::Refused(message.to_string()))
    }

    fn fail(&mut self, error: io::Error) -> TransferError {
        self.wire.poison();
        TransferError::Failed(error)
    }
}
