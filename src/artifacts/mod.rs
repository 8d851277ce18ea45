//! Data structures and algorithms
//!
//! - `branch`: Branch and reference names
//! - `objects`: Object types (blob, tree, commit) and identities
//! - `pack`: Pack archive encoding, decoding and delta resolution
//! - `transport`: Exchanging archives with another repository

pub mod branch;
pub mod objects;
pub mod pack;
pub mod transport;
