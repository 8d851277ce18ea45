//! Pack archives
//!
//! A pack bundles many objects into one stream for transfer:
//!
//! ```text
//! "PACK" | version (u32 BE) | entry count (u32 BE) | entries... | SHA-1 of all preceding bytes
//! ```
//!
//! Each entry is a packed `(type, size)` header followed by a zlib stream. Delta
//! entries additionally name their base, either by a backwards archive offset
//! (`OFS_DELTA`) or by object identity (`REF_DELTA`), and their zlib stream holds
//! delta instructions instead of the object payload.
//!
//! - `header`: the fixed 12-byte archive header
//! - `entry`: per-entry header and base-offset varints
//! - `delta`: delta instruction streams (apply and build)
//! - `writer`: archive encoder
//! - `reader`: archive decoder and delta resolver

pub mod delta;
pub mod entry;
pub mod header;
pub mod reader;
pub mod writer;

/// Magic bytes opening every archive
pub const SIGNATURE: &str = "PACK";

/// Version written by the encoder
pub const VERSION: u32 = 2;

/// Versions the decoder accepts (3 only differs in delta features we never emit)
pub const SUPPORTED_VERSIONS: [u32; 2] = [2, 3];

/// Length of the archive header: signature, version, entry count
pub const HEADER_SIZE: usize = 12;

/// Length of the SHA-1 trailer
pub const CHECKSUM_SIZE: usize = 20;

/// Entry type code of an offset-delta
pub const OFS_DELTA: u8 = 6;

/// Entry type code of a hash-delta
pub const REF_DELTA: u8 = 7;

/// Upper bound on buffer pre-allocation driven by sizes read from an archive
pub(crate) const MAX_PREALLOC: usize = 16 * 1024 * 1024;
