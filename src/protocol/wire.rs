use crate::error::ServerError;
use std::io::{Read, Write};

/// Writes a length-prefixed frame: a 4-byte big-endian length followed by the
/// payload bytes. Retries on short writes; a zero-byte write means the peer
/// has gone away and is treated as fatal.
pub fn send_frame<W: Write>(writer: &mut W, payload: &str) -> Result<(), ServerError> {
    let bytes = payload.as_bytes();
    let len = u32::try_from(bytes.len())
        .map_err(|_| ServerError::protocol("frame payload too large"))?;
    write_all_retrying(writer, &len.to_be_bytes())?;
    write_all_retrying(writer, bytes)?;
    Ok(())
}

fn write_all_retrying<W: Write>(writer: &mut W, mut buf: &[u8]) -> Result<(), ServerError> {
    while !buf.is_empty() {
        let n = writer.write(buf)?;
        if n == 0 {
            return Err(ServerError::protocol("connection broken: zero-byte write"));
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// Reads one length-prefixed frame and returns its payload as a `String`. EOF
/// at any point, including mid-frame, is fatal.
pub fn recv_frame<R: Read>(reader: &mut R) -> Result<String, ServerError> {
    let mut len_buf = [0u8; 4];
    read_exact_or_eof(reader, &mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    read_exact_or_eof(reader, &mut payload)?;

    String::from_utf8(payload).map_err(|_| ServerError::protocol("frame payload is not valid utf-8"))
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ServerError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ServerError::protocol("connection closed mid-frame")
        } else {
            ServerError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn send_then_recv_round_trips() {
        let mut buf = Vec::new();
        send_frame(&mut buf, "AGENCY_ID:1\n").unwrap();

        let mut cursor = Cursor::new(buf);
        let payload = recv_frame(&mut cursor).unwrap();
        assert_eq!(payload, "AGENCY_ID:1\n");
    }

    #[test]
    fn recv_fails_on_truncated_frame() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short");

        let mut cursor = Cursor::new(buf);
        assert!(recv_frame(&mut cursor).is_err());
    }

    #[test]
    fn recv_fails_on_empty_input() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(recv_frame(&mut cursor).is_err());
    }
}
