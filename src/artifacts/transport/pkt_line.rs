//! pkt-line framing
//!
//! Each line is prefixed with its total length (prefix included) as four hex
//! digits. `0000` is a flush packet that ends a section.

use crate::artifacts::pack::SIGNATURE;
use bytes::{BufMut, Bytes, BytesMut};

pub const FLUSH_PKT: &[u8] = b"0000";

const LENGTH_SIZE: usize = 4;

/// Largest payload a single pkt-line can carry
pub const MAX_PKT_PAYLOAD: usize = 65520 - LENGTH_SIZE;

pub fn write_line(buffer: &mut BytesMut, line: &[u8]) -> anyhow::Result<()> {
    if line.len() > MAX_PKT_PAYLOAD {
        anyhow::bail!("pkt-line payload of {} bytes is too long", line.len());
    }

    buffer.put_slice(format!("{:04x}", line.len() + LENGTH_SIZE).as_bytes());
    buffer.put_slice(line);
    Ok(())
}

pub fn write_flush(buffer: &mut BytesMut) {
    buffer.put_slice(FLUSH_PKT);
}

/// Read one section of pkt-lines from the front of `data`
///
/// Stops after a flush packet, at the end of the data, or where a pack archive
/// starts. Returns the line payloads and whatever follows them.
pub fn read_lines(data: &[u8]) -> anyhow::Result<(Vec<Bytes>, &[u8])> {
    let mut lines = Vec::new();
    let mut rest = data;

    while !rest.is_empty() && !rest.starts_with(SIGNATURE.as_bytes()) {
        let prefix = rest
            .get(..LENGTH_SIZE)
            .ok_or_else(|| anyhow::anyhow!("truncated pkt-line length"))?;
        let prefix = std::str::from_utf8(prefix)?;
        let length = usize::from_str_radix(prefix, 16)
            .map_err(|_| anyhow::anyhow!("invalid pkt-line length {prefix:?}"))?;

        if length == 0 {
            rest = &rest[LENGTH_SIZE..];
            break;
        }
        if length < LENGTH_SIZE {
            anyhow::bail!("invalid pkt-line length {length}");
        }

        let payload = rest
            .get(LENGTH_SIZE..length)
            .ok_or_else(|| anyhow::anyhow!("pkt-line of {length} bytes is truncated"))?;
        lines.push(Bytes::copy_from_slice(payload));
        rest = &rest[length..];
    }

    Ok((lines, rest))
}
