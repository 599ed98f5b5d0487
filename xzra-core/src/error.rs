//! Error types for XZ container parsing and random-access reads.

use std::fmt;

pub use lzma_raw::Error as BackendError;

/// Result alias using the crate-level [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes surfaced while building a [`crate::directory::Directory`]
/// or servicing a [`crate::reader::XzReader`] operation.
#[derive(Debug)]
pub enum Error {
    /// Stream header/footer magic bytes did not match.
    BadMagic {
        /// Absolute file offset of the field that failed to match.
        offset: u64,
    },

    /// An embedded CRC32 (stream header, block header, stream index, or
    /// stream footer) did not verify.
    ChecksumError {
        /// What was being checksummed, e.g. `"stream index"`.
        context: &'static str,
        /// Absolute file offset of the checksummed field.
        offset: u64,
    },

    /// Reserved bits in block flags or LZMA2 filter properties were nonzero.
    ReservedBitsSet {
        /// What was being parsed, e.g. `"block flags"`.
        context: &'static str,
    },

    /// A varint exceeded 63 bits, or an LZMA2 dictionary-size field exceeded 40.
    Overflow {
        /// What was being decoded, e.g. `"varint"` or `"LZMA2 dict size"`.
        context: &'static str,
    },

    /// A size recorded in a block header or produced by decompression
    /// disagreed with the stream index.
    SizeMismatch {
        /// What disagreed, e.g. `"block uncompressed size"`.
        context: &'static str,
        /// Size recorded in the index.
        expected: u64,
        /// Size actually observed.
        actual: u64,
    },

    /// Streams within one file declared different check kinds.
    MixedChecksumStreams,

    /// The largest block's uncompressed size exceeds the configured ceiling.
    BlockTooLarge {
        /// Uncompressed size of the largest block found while building the directory.
        max_block_uncomp: u64,
        /// Configured ceiling.
        max_block_size: u64,
    },

    /// A `seek` target was outside `[0, total_uncomp]`, or used an unsupported `whence`.
    InvalidSeek {
        /// The offset that was rejected.
        offset: i64,
    },

    /// A filter id was recognized but is not implemented by the block fetcher.
    UnsupportedFilter {
        /// The raw filter id from the block header.
        filter_id: u64,
    },

    /// A [`crate::reader::ReaderOptions`] value was rejected at `open`.
    InvalidOption(String),

    /// The external raw decompressor rejected a block's payload.
    Decompress(BackendError),

    /// Underlying file I/O failure.
    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadMagic { offset } => {
                write!(f, "bad magic bytes at offset {offset}")
            }
            Error::ChecksumError { context, offset } => {
                write!(f, "CRC32 mismatch in {context} at offset {offset}")
            }
            Error::ReservedBitsSet { context } => {
                write!(f, "reserved bits set in {context}")
            }
            Error::Overflow { context } => write!(f, "{context} overflowed"),
            Error::SizeMismatch {
                context,
                expected,
                actual,
            } => write!(f, "{context} mismatch: expected {expected}, got {actual}"),
            Error::MixedChecksumStreams => {
                write!(f, "streams in this file declare different check kinds")
            }
            Error::BlockTooLarge {
                max_block_uncomp,
                max_block_size,
            } => write!(
                f,
                "largest block ({max_block_uncomp} bytes) exceeds max_block_size ({max_block_size} bytes)",
            ),
            Error::InvalidSeek { offset } => write!(f, "invalid seek to offset {offset}"),
            Error::UnsupportedFilter { filter_id } => {
                write!(f, "filter id {filter_id:#x} is not implemented")
            }
            Error::InvalidOption(message) => write!(f, "invalid option: {message}"),
            Error::Decompress(err) => write!(f, "raw decompression failed: {err}"),
            Error::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decompress(err) => Some(err),
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Error::Decompress(err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::IoError(err) => err,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
