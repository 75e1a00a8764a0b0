//! Character set conversion for text-mode transfers.
//!
//! The wire always carries UTF-8. A handler working in another encoding
//! asks the upload or download handle for a conversion; only Latin-1 is
//! supported besides the wire default.

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    /// Looks up a charset by name, case-insensitively.
    pub fn for_name(name: &str) -> Option<Charset> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Latin1 => "latin1",
        }
    }
}

/// Latin-1 to UTF-8. Every byte maps to the code point of the same value,
/// so this cannot fail.
pub(crate) fn latin1_to_utf8(input: &[u8], out: &mut Vec<u8>) {
    for &byte in input {
        if byte < 0x80 {
            out.push(byte);
        } else {
            out.push(0xC0 | (byte >> 6));
            out.push(0x80 | (byte & 0x3F));
        }
    }
}

/// UTF-8 to Latin-1 for downloads. Input arrives in message-sized pieces
/// that may split a multi-byte sequence, so an incomplete tail is carried
/// over to the next call.
#[derive(Default)]
pub(crate) struct Utf8ToLatin1 {
    partial: Vec<u8>,
}

impl Utf8ToLatin1 {
    pub(crate) fn convert(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        let joined;
        let bytes: &[u8] = if self.partial.is_empty() {
            input
        } else {
            let mut buf = std::mem::take(&mut self.partial);
            buf.extend_from_slice(input);
            joined = buf;
            &joined
        };
        let (valid, rest) = match std::str::from_utf8(bytes) {
            Ok(_) => (bytes.len(), 0),
            // error_len() == None means the buffer merely ends mid-sequence
            Err(e) if e.error_len().is_none() => (e.valid_up_to(), bytes.len() - e.valid_up_to()),
            Err(_) => return Err(invalid_utf8()),
        };
        let text = std::str::from_utf8(&bytes[..valid]).map_err(|_| invalid_utf8())?;
        let tail = &bytes[bytes.len() - rest..];
        for ch in text.chars() {
            let code = ch as u32;
            if code > 0xFF {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("cannot represent '{ch}' in latin1"),
                ));
            }
            out.push(code as u8);
        }
        self.partial = tail.to_vec();
        Ok(())
    }

    /// Fails if the stream ended in the middle of a multi-byte sequence.
    pub(crate) fn finish(&self) -> io::Result<()> {
        if self.partial.is_empty() {
            Ok(())
        } else {
            Err(invalid_utf8())
        }
    }
}

fn invalid_utf8() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8 in text transfer")
}
