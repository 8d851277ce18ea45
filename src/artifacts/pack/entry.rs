//! Entry framing
//!
//! Every entry starts with a packed header: bits 4-6 of the first byte hold the
//! type code and its low 4 bits the low bits of the size. While the high bit of
//! a byte is set, the next byte carries 7 more size bits.
//!
//! Offset-deltas follow the header with the distance back to their base, in a
//! second varint flavour where each continuation adds one before shifting. That
//! makes every distance representable in exactly one way.

use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::{OFS_DELTA, REF_DELTA};
use bytes::{BufMut, BytesMut};

/// What an entry's zlib stream holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Whole(ObjectType),
    OfsDelta,
    RefDelta,
}

impl EntryKind {
    pub fn code(&self) -> u8 {
        match self {
            EntryKind::Whole(object_type) => object_type.pack_code(),
            EntryKind::OfsDelta => OFS_DELTA,
            EntryKind::RefDelta => REF_DELTA,
        }
    }

    /// Codes 0 and 5 are reserved and map to `None`
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            OFS_DELTA => Some(EntryKind::OfsDelta),
            REF_DELTA => Some(EntryKind::RefDelta),
            code => ObjectType::from_pack_code(code).map(EntryKind::Whole),
        }
    }

    pub fn is_delta(&self) -> bool {
        !matches!(self, EntryKind::Whole(_))
    }
}

pub fn encode_entry_header(kind: EntryKind, size: u64, buffer: &mut BytesMut) {
    let mut byte = (kind.code() << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;

    while rest > 0 {
        buffer.put_u8(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }

    buffer.put_u8(byte);
}

/// Decode a packed header into `(type code, size, bytes consumed)`
///
/// Returns `None` when the input ends mid-header or the size overflows 64 bits.
pub fn decode_entry_header(data: &[u8]) -> Option<(u8, u64, usize)> {
    let mut byte = *data.first()?;
    let code = (byte >> 4) & 0x07;
    let mut size = u64::from(byte & 0x0f);
    let mut shift = 4u32;
    let mut used = 1;

    while byte & 0x80 != 0 {
        byte = *data.get(used)?;
        used += 1;

        if shift > 63 - 7 {
            return None;
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }

    Some((code, size, used))
}

/// Encode the distance from an offset-delta back to its base
pub fn encode_base_offset(distance: u64, buffer: &mut BytesMut) {
    let mut scratch = [0u8; 10];
    let mut pos = scratch.len() - 1;
    let mut rest = distance;

    scratch[pos] = (rest & 0x7f) as u8;
    rest >>= 7;
    while rest > 0 {
        rest -= 1;
        pos -= 1;
        scratch[pos] = 0x80 | (rest & 0x7f) as u8;
        rest >>= 7;
    }

    buffer.put_slice(&scratch[pos..]);
}

/// Decode an offset-delta distance into `(distance, bytes consumed)`
pub fn decode_base_offset(data: &[u8]) -> Option<(u64, usize)> {
    let mut byte = *data.first()?;
    let mut distance = u64::from(byte & 0x7f);
    let mut used = 1;

    while byte & 0x80 != 0 {
        byte = *data.get(used)?;
        used += 1;

        distance = distance
            .checked_add(1)?
            .checked_mul(128)?
            .checked_add(u64::from(byte & 0x7f))?;
    }

    Some((distance, used))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;
    use rstest::rstest;

    #[rstest]
    #[case(0, &[0x00])]
    #[case(127, &[0x7f])]
    #[case(128, &[0x80, 0x00])]
    #[case(129, &[0x80, 0x01])]
    #[case(16511, &[0xff, 0x7f])]
    #[case(16512, &[0x80, 0x80, 0x00])]
    fn base_offsets_add_one_per_continuation(#[case] distance: u64, #[case] encoded: &[u8]) {
        let mut buffer = BytesMut::new();
        encode_base_offset(distance, &mut buffer);

        assert_eq!(buffer.as_ref(), encoded);
        assert_eq!(decode_base_offset(encoded), Some((distance, encoded.len())));
    }

    #[test]
    fn plain_shift_reading_would_be_wrong() {
        // without the +1 rule these bytes would mean 128 * 0 + 0 = 0
        assert_eq!(decode_base_offset(&[0x80, 0x00]), Some((128, 2)));
    }

    #[rstest]
    #[case(EntryKind::Whole(ObjectType::Blob), 6, &[0x36])]
    #[case(EntryKind::Whole(ObjectType::Commit), 15, &[0x1f])]
    #[case(EntryKind::Whole(ObjectType::Tree), 16, &[0xa0, 0x01])]
    #[case(EntryKind::OfsDelta, 100, &[0xe4, 0x06])]
    fn packs_type_and_size(#[case] kind: EntryKind, #[case] size: u64, #[case] encoded: &[u8]) {
        let mut buffer = BytesMut::new();
        encode_entry_header(kind, size, &mut buffer);

        assert_eq!(buffer.as_ref(), encoded);
        assert_eq!(
            decode_entry_header(encoded),
            Some((kind.code(), size, encoded.len()))
        );
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert_eq!(decode_entry_header(&[]), None);
        assert_eq!(decode_entry_header(&[0xb5]), None);
        assert_eq!(decode_base_offset(&[0x80]), None);
    }

    #[test]
    fn reserved_codes_are_invalid() {
        assert_eq!(EntryKind::from_code(0), None);
        assert_eq!(EntryKind::from_code(5), None);
        assert_eq!(EntryKind::from_code(7), Some(EntryKind::RefDelta));
        assert_eq!(
            EntryKind::from_code(4),
            Some(EntryKind::Whole(ObjectType::Tag))
        );
    }

    proptest! {
        #[test]
        fn any_distance_decodes_to_itself(distance in 0u64..(1 << 56)) {
            let mut buffer = BytesMut::new();
            encode_base_offset(distance, &mut buffer);
            assert_eq!(decode_base_offset(&buffer), Some((distance, buffer.len())));
        }
    }
}
