//! Block framing over a byte stream.
//!
//! Messages travel as a sequence of blocks. Each block carries a
//! little-endian u16 header, `payload_len << 1 | is_last`, followed by up to
//! [`MAX_BLOCK_PAYLOAD`] payload bytes; the block with the `is_last` bit set
//! ends the message. A zero-length last block is a valid, empty message and
//! is used as an end-of-data marker by the transfer protocol.

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

pub const MAX_BLOCK_PAYLOAD: usize = 8190;

/// Message-oriented view of the connection as needed by the transfer
/// coordinator. Erases the underlying stream type so handler traits stay
/// object-safe.
pub trait MessageWire {
    /// Stages bytes for the current outgoing message.
    fn put_bytes(&mut self, src: &[u8]);
    /// Bytes staged but not yet sent.
    fn buffered(&self) -> usize;
    /// Drops the staged bytes without sending them.
    fn discard_buffered(&mut self);
    /// Sends the staged bytes as one complete message and flushes.
    fn end_message(&mut self) -> io::Result<()>;
    /// Reads one complete message.
    fn read_message(&mut self) -> io::Result<Bytes>;
    /// Marks the connection as unusable; every later operation fails.
    fn poison(&mut self);
    fn is_poisoned(&self) -> bool;
}

pub struct BlockStream<S> {
    stream: S,
    buf: BytesMut,
    poisoned: bool,
}

impl<S> BlockStream<S> {
    pub fn from_stream(stream: S) -> Self {
        BlockStream {
            stream,
            buf: BytesMut::new(),
            poisoned: false,
        }
    }

    /// Consumes the stream and returns the underlying stream and any
    /// staged, unsent bytes.
    pub fn into_parts(self) -> (S, Vec<u8>) {
        (self.stream, self.buf.to_vec())
    }

    fn check_open(&self) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            ));
        }
        Ok(())
    }
}

impl<S: Write> BlockStream<S> {
    fn write_block(&mut self, payload: &[u8], last: bool) -> io::Result<()> {
        debug_assert!(payload.len() <= MAX_BLOCK_PAYLOAD);
        let header = ((payload.len() as u16) << 1) | last as u16;
        self.stream.write_all(&header.to_le_bytes())?;
        self.stream.write_all(payload)
    }
}

impl<S: Read + Write> MessageWire for BlockStream<S> {
    fn put_bytes(&mut self, src: &[u8]) {
        self.buf.put(src);
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn discard_buffered(&mut self) {
        self.buf.clear();
    }

    fn end_message(&mut self) -> io::Result<()> {
        self.check_open()?;
        while self.buf.len() > MAX_BLOCK_PAYLOAD {
            let block = self.buf.split_to(MAX_BLOCK_PAYLOAD);
            self.write_block(&block, false)?;
        }
        let block = self.buf.split();
        self.write_block(&block, true)?;
        self.stream.flush()
    }

    fn read_message(&mut self) -> io::Result<Bytes> {
        self.check_open()?;
        let mut body = BytesMut::new();
        loop {
            let mut header = [0; 2];
            self.stream.read_exact(&mut header)?;
            let header = u16::from_le_bytes(header);
            let len = (header >> 1) as usize;
            if len > MAX_BLOCK_PAYLOAD {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("block size {len} exceeds {MAX_BLOCK_PAYLOAD}"),
                ));
            }
            let start = body.len();
            body.resize(start + len, 0);
            self.stream.read_exact(&mut body[start..])?;
            if header & 1 == 1 {
                return Ok(body.freeze());
            }
        }
    }

    fn poison(&mut self) {
        self.poisoned = true;
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}
