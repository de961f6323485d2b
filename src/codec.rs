//! The wire format: UTF-8 text, one message per line, `\n` terminated.
//!
//! No length prefix, no header, no checksum. The decoder tolerates a
//! trailing `\r` so a peer writing CRLF line endings interoperates, and
//! flushes a final unterminated line when the stream ends.

use std::{io, str};

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Splits a byte stream into lines and joins lines back into bytes.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Offset into the buffer already scanned for a terminator, so a long
    /// line arriving in many reads is not rescanned from the start.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> LineCodec {
        LineCodec { next_index: 0 }
    }
}

fn utf8_line(line: &[u8]) -> Result<String, io::Error> {
    str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "received line is not valid UTF-8"))
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match buf[self.next_index..].iter().position(|byte| *byte == b'\n') {
            Some(offset) => {
                let mut line = buf.split_to(self.next_index + offset + 1);
                self.next_index = 0;
                line.truncate(line.len() - 1);
                if line.ends_with(b"\r") {
                    line.truncate(line.len() - 1);
                }
                Ok(Some(utf8_line(&line)?))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None if buf.is_empty() => Ok(None),
            // The peer closed mid-line; surface what we have, like a
            // read-line over a plain stream would.
            None => {
                let line = buf.split();
                self.next_index = 0;
                Ok(Some(utf8_line(&line)?))
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut lines = vec![];
        while let Some(line) = codec.decode(buf).expect("decode") {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn splits_lines_and_strips_terminators() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"hello\nwindows line\r\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["hello", "windows line"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn buffers_partial_line_until_terminator_arrives() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"hel"[..]);
        assert_eq!(codec.decode(&mut buf).expect("decode"), None);
        buf.put_slice(b"lo\n");
        assert_eq!(codec.decode(&mut buf).expect("decode"), Some("hello".to_owned()));
    }

    #[test]
    fn eof_flushes_unterminated_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"last words"[..]);
        assert_eq!(codec.decode(&mut buf).expect("decode"), None);
        assert_eq!(codec.decode_eof(&mut buf).expect("decode_eof"), Some("last words".to_owned()));
        assert_eq!(codec.decode_eof(&mut buf).expect("decode_eof"), None);
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);
        let err = codec.decode(&mut buf).expect_err("bad utf-8 must not decode");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn encode_appends_exactly_one_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("hi there".to_owned(), &mut buf).expect("encode");
        assert_eq!(&buf[..], b"hi there\n");
    }
}
