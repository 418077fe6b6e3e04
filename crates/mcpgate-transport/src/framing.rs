// crates/mcpgate-transport/src/framing.rs
// ============================================================================
// Module: Stdio JSON-RPC Framing
// Description: `Content-Length`-prefixed message framing shared by the
//              stdio transport and the stdio→HTTP adapter.
// Purpose: Give both sides of a stdio pipe one implementation of the wire
//          framing instead of duplicating it.
// Dependencies: none beyond std
// ============================================================================

//! ## Overview
//! MCP servers speaking stdio use the same `Content-Length` header framing
//! as LSP: a header block terminated by a blank line, followed by exactly
//! that many bytes of JSON-RPC payload.

use std::io::BufRead;
use std::io::Read;
use std::io::Write;

use crate::FramingError;

/// Reads one `Content-Length`-framed message from `reader`.
///
/// # Errors
/// Returns [`FramingError::Io`] on I/O failure, [`FramingError::Closed`] if
/// the stream ends before a header is read, [`FramingError::MissingHeader`]
/// if no `Content-Length` header is present, and
/// [`FramingError::TooLarge`] if the declared length exceeds `max_bytes`.
pub fn read_framed(reader: &mut impl BufRead, max_bytes: usize) -> Result<Vec<u8>, FramingError> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).map_err(FramingError::Io)?;
        if bytes == 0 {
            return Err(FramingError::Closed);
        }
        if line.trim().is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| FramingError::MissingHeader)?;
            content_length = Some(parsed);
        }
    }
    let len = content_length.ok_or(FramingError::MissingHeader)?;
    if len > max_bytes {
        return Err(FramingError::TooLarge {
            actual: len,
            limit: max_bytes,
        });
    }
    let mut buf = vec![0_u8; len];
    reader.read_exact(&mut buf).map_err(FramingError::Io)?;
    Ok(buf)
}

/// Writes one `Content-Length`-framed message to `writer`.
///
/// # Errors
/// Returns [`FramingError::Io`] on write failure.
pub fn write_framed(writer: &mut impl Write, payload: &[u8]) -> Result<(), FramingError> {
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer.write_all(header.as_bytes()).map_err(FramingError::Io)?;
    writer.write_all(payload).map_err(FramingError::Io)?;
    writer.flush().map_err(FramingError::Io)
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::io::Cursor;

    use super::*;

    #[test]
    fn round_trips_a_framed_message() {
        let mut buf = Vec::new();
        write_framed(&mut buf, br#"{"jsonrpc":"2.0"}"#).unwrap();
        let mut reader = BufReader::new(Cursor::new(buf));
        let got = read_framed(&mut reader, 1024).unwrap();
        assert_eq!(got, br#"{"jsonrpc":"2.0"}"#);
    }

    #[test]
    fn rejects_oversized_declared_length() {
        let mut buf = Vec::new();
        write_framed(&mut buf, &vec![b'x'; 100]).unwrap();
        let mut reader = BufReader::new(Cursor::new(buf));
        let err = read_framed(&mut reader, 10).unwrap_err();
        assert!(matches!(err, FramingError::TooLarge { limit: 10, .. }));
    }

    #[test]
    fn missing_header_is_rejected() {
        let mut reader = BufReader::new(Cursor::new(b"\r\n".to_vec()));
        let err = read_framed(&mut reader, 1024).unwrap_err();
        assert!(matches!(err, FramingError::MissingHeader));
    }
}
