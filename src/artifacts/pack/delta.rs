//! Delta instruction streams
//!
//! A delta rebuilds a target object out of a base object:
//!
//! ```text
//! base size (varint) | result size (varint) | opcodes...
//! ```
//!
//! Both sizes use 7-bit little-endian groups with the high bit as continuation.
//! An opcode with its high bit set copies a range of the base: bits 0-3 say which
//! of four little-endian offset bytes follow, bits 4-6 which of three size bytes
//! follow, and a size of zero stands for 0x10000. Any other non-zero opcode inserts
//! that many literal bytes from the stream. Opcode zero is reserved.

use crate::artifacts::pack::MAX_PREALLOC;
use bytes::{BufMut, Bytes, BytesMut};

/// Largest size a single copy opcode is emitted with
const MAX_COPY_SIZE: usize = 0x10000;

/// Largest literal run a single insert opcode can carry
const MAX_INSERT_SIZE: usize = 0x7f;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    #[error("delta stream ends inside {0}")]
    Truncated(&'static str),

    #[error("delta expects a {declared} byte base but the base has {actual} bytes")]
    BaseSizeMismatch { declared: u64, actual: usize },

    #[error("copy of {size} bytes at {offset} exceeds base of {base_len} bytes")]
    CopyOutOfBounds {
        offset: usize,
        size: usize,
        base_len: usize,
    },

    #[error("{0} does not fit in 64 bits")]
    SizeOverflow(&'static str),

    #[error("reserved opcode 0x00 at position {0}")]
    ReservedOpcode(usize),

    #[error("delta declares {declared} result bytes but produces {actual}")]
    ResultSizeMismatch { declared: u64, actual: usize },
}

fn read_size(delta: &[u8], pos: &mut usize, field: &'static str) -> Result<u64, DeltaError> {
    let mut size = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = *delta.get(*pos).ok_or(DeltaError::Truncated(field))?;
        *pos += 1;

        let group = u64::from(byte & 0x7f);
        // every set bit of the group has to land inside 64 bits
        if shift >= u64::BITS || (group << shift) >> shift != group {
            return Err(DeltaError::SizeOverflow(field));
        }
        size |= group << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(size);
        }
    }
}

fn write_size(mut size: u64, buffer: &mut BytesMut) {
    while size >= 0x80 {
        buffer.put_u8((size & 0x7f) as u8 | 0x80);
        size >>= 7;
    }
    buffer.put_u8(size as u8);
}

/// Declared `(base size, result size)` of a delta stream
pub fn delta_sizes(delta: &[u8]) -> Result<(u64, u64), DeltaError> {
    let mut pos = 0;
    let base_size = read_size(delta, &mut pos, "base size")?;
    let result_size = read_size(delta, &mut pos, "result size")?;

    Ok((base_size, result_size))
}

/// Rebuild the target object from `base` and a delta stream
///
/// Only the output buffer is allocated, pre-sized from the declared result size.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let mut pos = 0;

    let base_size = read_size(delta, &mut pos, "base size")?;
    if base_size != base.len() as u64 {
        return Err(DeltaError::BaseSizeMismatch {
            declared: base_size,
            actual: base.len(),
        });
    }

    let result_size = read_size(delta, &mut pos, "result size")?;
    let mut result = Vec::with_capacity((result_size as usize).min(MAX_PREALLOC));

    while pos < delta.len() {
        let opcode = delta[pos];
        pos += 1;

        if opcode & 0x80 != 0 {
            let mut offset = 0usize;
            for i in 0..4 {
                if opcode & (1 << i) != 0 {
                    let byte = *delta.get(pos).ok_or(DeltaError::Truncated("copy offset"))?;
                    pos += 1;
                    offset |= usize::from(byte) << (8 * i);
                }
            }

            let mut size = 0usize;
            for i in 0..3 {
                if opcode & (0x10 << i) != 0 {
                    let byte = *delta.get(pos).ok_or(DeltaError::Truncated("copy size"))?;
                    pos += 1;
                    size |= usize::from(byte) << (8 * i);
                }
            }
            if size == 0 {
                size = MAX_COPY_SIZE;
            }

            let range = offset
                .checked_add(size)
                .filter(|end| *end <= base.len())
                .map(|end| offset..end)
                .ok_or(DeltaError::CopyOutOfBounds {
                    offset,
                    size,
                    base_len: base.len(),
                })?;
            result.extend_from_slice(&base[range]);
        } else if opcode != 0 {
            let size = usize::from(opcode);
            let literal = delta
                .get(pos..pos + size)
                .ok_or(DeltaError::Truncated("insert"))?;
            pos += size;
            result.extend_from_slice(literal);
        } else {
            return Err(DeltaError::ReservedOpcode(pos - 1));
        }
    }

    if result.len() as u64 != result_size {
        return Err(DeltaError::ResultSizeMismatch {
            declared: result_size,
            actual: result.len(),
        });
    }

    Ok(result)
}

/// Assembles a delta stream opcode by opcode
///
/// Long copies and inserts are split into as many opcodes as the format needs.
#[derive(Debug)]
pub struct DeltaBuilder {
    base_size: usize,
    result_size: usize,
    opcodes: BytesMut,
}

impl DeltaBuilder {
    pub fn new(base_size: usize) -> Self {
        DeltaBuilder {
            base_size,
            result_size: 0,
            opcodes: BytesMut::new(),
        }
    }

    /// Copy `size` bytes of the base starting at `offset`
    pub fn copy(&mut self, mut offset: usize, mut size: usize) -> &mut Self {
        while size > 0 {
            let chunk = size.min(MAX_COPY_SIZE);
            self.push_copy(offset, chunk);
            offset += chunk;
            size -= chunk;
        }
        self
    }

    fn push_copy(&mut self, offset: usize, size: usize) {
        let mut opcode = 0x80u8;
        let mut operands = [0u8; 7];
        let mut len = 0;

        for i in 0..4 {
            let byte = ((offset >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                opcode |= 1 << i;
                operands[len] = byte;
                len += 1;
            }
        }

        // a size of 0x10000 is spelled with no size bytes at all
        let size = if size == MAX_COPY_SIZE { 0 } else { size };
        for i in 0..3 {
            let byte = ((size >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                opcode |= 0x10 << i;
                operands[len] = byte;
                len += 1;
            }
        }

        self.opcodes.put_u8(opcode);
        self.opcodes.put_slice(&operands[..len]);
        self.result_size += if size == 0 { MAX_COPY_SIZE } else { size };
    }

    /// Append literal bytes
    pub fn insert(&mut self, data: &[u8]) -> &mut Self {
        for chunk in data.chunks(MAX_INSERT_SIZE) {
            self.opcodes.put_u8(chunk.len() as u8);
            self.opcodes.put_slice(chunk);
        }
        self.result_size += data.len();
        self
    }

    pub fn result_size(&self) -> usize {
        self.result_size
    }

    pub fn finish(&self) -> Bytes {
        let mut stream = BytesMut::with_capacity(self.opcodes.len() + 20);
        write_size(self.base_size as u64, &mut stream);
        write_size(self.result_size as u64, &mut stream);
        stream.put_slice(&self.opcodes);

        stream.freeze()
    }

    /// Delta that keeps the common prefix and suffix of `base` and inserts the rest
    pub fn diff(base: &[u8], target: &[u8]) -> Bytes {
        let prefix = base
            .iter()
            .zip(target)
            .take_while(|(left, right)| left == right)
            .count();
        let suffix = base[prefix..]
            .iter()
            .rev()
            .zip(target[prefix..].iter().rev())
            .take_while(|(left, right)| left == right)
            .count();

        let mut builder = DeltaBuilder::new(base.len());
        builder.copy(0, prefix);
        builder.insert(&target[prefix..target.len() - suffix]);
        builder.copy(base.len() - suffix, suffix);

        builder.finish()
    }
}
