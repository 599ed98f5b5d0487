//! # xzra-core
//!
//! Random-access reading of multi-block, multi-stream XZ containers.
//!
//! Unlike a streaming decompressor, [`XzReader`] treats an XZ file as a
//! seekable, decompressed view: it walks the file's stream indices backward
//! from EOF once at open time to build a directory of block boundaries, then
//! decompresses only the blocks a read actually touches, caching them under
//! an LRU policy.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::{Read, Seek, SeekFrom};
//!
//! use xzra_core::{ReaderOptions, XzReader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("archive.xz")?;
//! let mut reader = XzReader::open(file, ReaderOptions::new())?;
//!
//! reader.seek(SeekFrom::Start(1024))?;
//! let mut buf = [0u8; 64];
//! reader.read_exact(&mut buf)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Container format
//!
//! The decoder implemented here (see [`frame`]) understands the subset of
//! the XZ format needed for random access: stream headers/footers, stream
//! indices, block headers, and LZMA2-filtered block payloads. BCJ filters
//! and the legacy `.lzma` container are out of scope; encoding is out of
//! scope entirely.

mod cache;
mod crc32;
mod crc64;
mod directory;
mod error;
mod fetch;
mod frame;
mod lzma2;
mod reader;
mod varint;

pub use crate::directory::{BlockEntry, BlockInfo, Directory, StreamEntry};
pub use crate::error::{BackendError, Error, Result};
pub use crate::frame::CheckKind;
pub use crate::reader::{ReaderOptions, XzReader};

/// Calculates the compression/decompression ratio as a percentage.
///
/// # Parameters
///
/// * `numerator` - Output byte count
/// * `denominator` - Input byte count
///
/// # Returns
///
/// The ratio as a percentage (0.0-100.0+), or 0.0 if denominator is zero.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }

    let denominator = u128::from(denominator);
    let numerator = u128::from(numerator);
    let scaled = numerator.saturating_mul(1000);
    let percent_tenths = (scaled + (denominator / 2)) / denominator;
    let percent_tenths_u32 = u32::try_from(percent_tenths).unwrap_or(u32::MAX);

    f64::from(percent_tenths_u32) / 10.0
}
