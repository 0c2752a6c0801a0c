/// Length-prefixed framing of the diagnostics stream.
///
/// ```text
/// ┌──────────────────┬──────────────────────────────┐
/// │ len: u32 LE      │ payload: len bytes of JSON   │
/// └──────────────────┴──────────────────────────────┘
/// ```
use crate::error::FrameError;
use crate::model::DiagnosticSnapshot;
use std::io::Read;

/// Read one frame's payload from `stream`.
///
/// Blocks until the whole payload has arrived. A length prefix above
/// `max_len` is an error without reading the payload: the stream is no
/// longer on a frame boundary afterwards.
pub fn read_frame<R: Read + ?Sized>(stream: &mut R, max_len: u32) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix)?;
    let len = u32::from_le_bytes(prefix);
    if len > max_len {
        return Err(FrameError::Oversized { len, max: max_len });
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

/// Parse a frame payload as a diagnostics message.
pub fn parse_payload(payload: &[u8]) -> Result<DiagnosticSnapshot, FrameError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, ErrorKind};

    #[test]
    fn reads_consecutive_frames() {
        let mut bytes = encode_frame(br#"{"writeSequence": 2}"#);
        bytes.extend(encode_frame(br#"{"writeSequence": 4}"#));
        let mut stream = Cursor::new(bytes);

        let first = parse_payload(&read_frame(&mut stream, 1024).unwrap()).unwrap();
        let second = parse_payload(&read_frame(&mut stream, 1024).unwrap()).unwrap();
        assert_eq!(first.write_sequence, 2);
        assert_eq!(second.write_sequence, 4);
    }

    /// `{"a"` is a complete frame with an incomplete JSON payload.
    #[test]
    fn truncated_json_is_a_payload_error() {
        let mut stream = Cursor::new(vec![0x04, 0x00, 0x00, 0x00, 0x7B, 0x22, 0x61, 0x22]);
        let payload = read_frame(&mut stream, 1024).unwrap();
        assert_eq!(payload, b"{\"a\"");
        assert!(matches!(parse_payload(&payload), Err(FrameError::Payload(_))));
    }

    #[test]
    fn oversized_prefix_is_rejected_before_payload() {
        let mut stream = Cursor::new(encode_frame(&[b' '; 64]));
        match read_frame(&mut stream, 16) {
            Err(FrameError::Oversized { len, max }) => {
                assert_eq!((len, max), (64, 16));
                assert_eq!(stream.position(), 4);
            }
            other => panic!("expected oversized error, got {other:?}"),
        }
    }

    #[test]
    fn eof_mid_frame_is_an_io_error() {
        let mut stream = Cursor::new(vec![0x10, 0x00, 0x00, 0x00, b'{']);
        match read_frame(&mut stream, 1024) {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_frame_is_empty_payload() {
        let mut stream = Cursor::new(vec![0, 0, 0, 0]);
        assert!(read_frame(&mut stream, 16).unwrap().is_empty());
    }
}
