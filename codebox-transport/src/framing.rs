//! Backend wire framing (§4.D): a 4-byte **network-byte-order** (big
//! endian) unsigned length prefix followed by exactly that many payload
//! bytes. A short read — the peer closing before the full payload
//! arrives — is a protocol error, not a silent truncation.

use std::io::{self, Read, Write};

use anyhow::{bail, Context};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Writes one length-prefixed frame.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> anyhow::Result<()> {
    w.write_u32::<BigEndian>(payload.len() as u32).context("writing frame length prefix")?;
    w.write_all(payload).context("writing frame payload")?;
    w.flush().context("flushing frame")?;
    Ok(())
}

/// Reads one length-prefixed frame. A zero-byte read of the length prefix
/// (clean EOF before any bytes) is reported distinctly from a short read
/// mid-payload so callers can tell a graceful disconnect from a corrupted
/// stream.
pub fn read_frame<R: Read>(r: &mut R) -> anyhow::Result<Vec<u8>> {
    let len = match r.read_u32::<BigEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            bail!("peer closed connection before sending a frame length prefix")
        }
        Err(e) => return Err(e).context("reading frame length prefix"),
    };
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).context("reading frame payload (short read)")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = Cursor::new(buf);
        let payload = read_frame(&mut cursor).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn empty_payload_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn short_read_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello world").unwrap();
        buf.truncate(6); // keep the length prefix but drop most of the payload
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn empty_stream_is_an_error() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).is_err());
    }
}
