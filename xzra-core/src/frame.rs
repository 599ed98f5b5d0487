//! Decoders for the fixed-format pieces of an XZ container: stream header,
//! stream footer, block header, and stream index.

use crate::crc32::crc32;
use crate::error::{Error, Result};
use crate::varint::decode_varint_from_slice;

/// Size in bytes of a Stream Header or Stream Footer.
pub const STREAM_HEADER_SIZE: usize = 12;

/// Magic bytes at the start of a Stream Header.
pub const STREAM_HEADER_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// Magic bytes at the end of a Stream Footer.
pub const STREAM_FOOTER_MAGIC: [u8; 2] = [0x59, 0x5A];

/// `LZMA_FILTER_LZMA2` as used in block header filter chains.
pub const LZMA2_FILTER_ID: u64 = 0x21;

/// Stream Padding is a run of `0x00` bytes whose length is a multiple of this.
pub const ALIGNMENT: u64 = 4;

/// Integrity check algorithm declared in a stream's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// No integrity check.
    None,
    /// CRC32 (4-byte check field).
    Crc32,
    /// CRC64 (8-byte check field).
    Crc64,
    /// SHA-256 (32-byte check field).
    Sha256,
}

impl CheckKind {
    /// Decode the low nibble of a stream flags byte into a [`CheckKind`].
    fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0x00 => Ok(CheckKind::None),
            0x01 => Ok(CheckKind::Crc32),
            0x04 => Ok(CheckKind::Crc64),
            0x0A => Ok(CheckKind::Sha256),
            _ => Err(Error::ReservedBitsSet {
                context: "stream flags check kind",
            }),
        }
    }

    /// Size in bytes of this check's trailing field in a block.
    pub fn check_size(self) -> u64 {
        match self {
            CheckKind::None => 0,
            CheckKind::Crc32 => 4,
            CheckKind::Crc64 => 8,
            CheckKind::Sha256 => 32,
        }
    }
}

/// A decoded Stream Header.
#[derive(Debug, Clone, Copy)]
pub struct StreamHeader {
    /// Integrity check declared for this stream.
    pub check_kind: CheckKind,
}

fn parse_stream_flags(flags: &[u8; 2], context: &'static str) -> Result<CheckKind> {
    if flags[0] != 0 {
        return Err(Error::ReservedBitsSet { context });
    }
    if flags[1] & 0xF0 != 0 {
        return Err(Error::ReservedBitsSet { context });
    }
    CheckKind::from_nibble(flags[1] & 0x0F)
}

/// Parse a 12-byte Stream Header located at `offset`.
///
/// # Errors
///
/// Returns [`Error::BadMagic`] if the magic bytes don't match, or
/// [`Error::ChecksumError`] if the embedded CRC32 doesn't verify.
pub fn parse_stream_header(bytes: &[u8; STREAM_HEADER_SIZE], offset: u64) -> Result<StreamHeader> {
    if bytes[0..6] != STREAM_HEADER_MAGIC {
        return Err(Error::BadMagic { offset });
    }

    let flags: [u8; 2] = [bytes[6], bytes[7]];
    let check_kind = parse_stream_flags(&flags, "stream header flags")?;

    let stored_crc = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if stored_crc != crc32(&flags) {
        return Err(Error::ChecksumError {
            context: "stream header",
            offset,
        });
    }

    Ok(StreamHeader { check_kind })
}

/// A decoded Stream Footer.
#[derive(Debug, Clone, Copy)]
pub struct StreamFooter {
    /// Real size in bytes of the Stream Index that precedes this footer.
    pub index_size: u64,
    /// Integrity check declared for this stream.
    pub check_kind: CheckKind,
}

/// Parse a 12-byte Stream Footer located at `offset`.
///
/// # Errors
///
/// Returns [`Error::BadMagic`] if the magic bytes don't match, or
/// [`Error::ChecksumError`] if the embedded CRC32 doesn't verify.
pub fn parse_stream_footer(bytes: &[u8; STREAM_HEADER_SIZE], offset: u64) -> Result<StreamFooter> {
    let stored_crc = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if stored_crc != crc32(&bytes[4..10]) {
        return Err(Error::ChecksumError {
            context: "stream footer",
            offset,
        });
    }

    let backward_size_encoded = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let index_size = (u64::from(backward_size_encoded) + 1) * ALIGNMENT;

    let flags: [u8; 2] = [bytes[8], bytes[9]];
    let check_kind = parse_stream_flags(&flags, "stream footer flags")?;

    if bytes[10..12] != STREAM_FOOTER_MAGIC {
        return Err(Error::BadMagic { offset: offset + 10 });
    }

    Ok(StreamFooter {
        index_size,
        check_kind,
    })
}

/// One `(unpadded_size, uncomp_size)` pair from a Stream Index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Block header + compressed payload + check field length, excluding padding.
    pub unpadded_size: u64,
    /// Decompressed payload length.
    pub uncomp_size: u64,
}

/// Parse a complete Stream Index field (indicator byte through trailing CRC32).
///
/// # Errors
///
/// Returns [`Error::BadMagic`] if the leading indicator byte isn't `0x00`,
/// [`Error::ReservedBitsSet`] if the alignment padding isn't all zero, and
/// [`Error::ChecksumError`] if the trailing CRC32 doesn't verify.
pub fn parse_stream_index(buf: &[u8], offset: u64) -> Result<Vec<IndexRecord>> {
    if buf.first() != Some(&0x00) {
        return Err(Error::BadMagic { offset });
    }

    let mut pos = 1usize;
    let (record_count, n) = decode_varint_from_slice(&buf[pos..])?;
    pos += n;

    let mut records = Vec::new();
    for _ in 0..record_count {
        let (unpadded_size, n1) = decode_varint_from_slice(&buf[pos..])?;
        pos += n1;
        let (uncomp_size, n2) = decode_varint_from_slice(&buf[pos..])?;
        pos += n2;
        records.push(IndexRecord {
            unpadded_size,
            uncomp_size,
        });
    }

    let body_len = pos;
    let padded_len = body_len.div_ceil(4) * 4;
    let total_len = padded_len + 4;

    if buf.len() != total_len {
        return Err(Error::SizeMismatch {
            context: "stream index length",
            expected: total_len as u64,
            actual: buf.len() as u64,
        });
    }

    if buf[body_len..padded_len].iter().any(|&b| b != 0) {
        return Err(Error::ReservedBitsSet {
            context: "stream index padding",
        });
    }

    let stored_crc = u32::from_le_bytes(buf[padded_len..padded_len + 4].try_into().unwrap());
    if stored_crc != crc32(&buf[..padded_len]) {
        return Err(Error::ChecksumError {
            context: "stream index",
            offset,
        });
    }

    Ok(records)
}

/// One filter entry in a block header's filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    /// Raw filter id as it appears in the block header.
    pub id: u64,
    /// Raw filter properties bytes.
    pub props: Vec<u8>,
}

/// A decoded Block Header.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// Real header size in bytes, `(encoded_size_byte + 1) * 4`.
    pub header_size: u64,
    /// Compressed payload size, if present in the header.
    pub compressed_size: Option<u64>,
    /// Uncompressed payload size, if present in the header.
    pub uncompressed_size: Option<u64>,
    /// Ordered filter chain applied to the block's payload.
    pub filters: Vec<FilterEntry>,
}

/// Parse a Block Header whose length is already known to be `buf.len()`.
///
/// The caller is responsible for reading `(buf[0] + 1) * 4` bytes before
/// calling this function, since the header's own length is self-describing.
///
/// # Errors
///
/// Returns [`Error::ReservedBitsSet`] for nonzero reserved bits,
/// [`Error::SizeMismatch`] for malformed filter/props framing, and
/// [`Error::ChecksumError`] if the trailing CRC32 doesn't verify.
pub fn parse_block_header(buf: &[u8], offset: u64) -> Result<BlockHeader> {
    if buf.len() < 6 {
        return Err(Error::SizeMismatch {
            context: "block header length",
            expected: 6,
            actual: buf.len() as u64,
        });
    }

    let header_size = (u64::from(buf[0]) + 1) * ALIGNMENT;
    if !(6..=1024).contains(&header_size) || buf.len() as u64 != header_size {
        return Err(Error::SizeMismatch {
            context: "block header size",
            expected: header_size,
            actual: buf.len() as u64,
        });
    }

    let block_flags = buf[1];
    if block_flags & 0b0011_1100 != 0 {
        return Err(Error::ReservedBitsSet {
            context: "block flags",
        });
    }
    let filter_count = (block_flags & 0x03) + 1;
    let has_compressed_size = block_flags & 0x40 != 0;
    let has_uncompressed_size = block_flags & 0x80 != 0;

    let mut pos = 2usize;

    let compressed_size = if has_compressed_size {
        let (value, n) = decode_varint_from_slice(&buf[pos..])?;
        pos += n;
        Some(value)
    } else {
        None
    };

    let uncompressed_size = if has_uncompressed_size {
        let (value, n) = decode_varint_from_slice(&buf[pos..])?;
        pos += n;
        Some(value)
    } else {
        None
    };

    let mut filters = Vec::with_capacity(usize::from(filter_count));
    for _ in 0..filter_count {
        let (id, n1) = decode_varint_from_slice(&buf[pos..])?;
        pos += n1;
        let (size_of_props, n2) = decode_varint_from_slice(&buf[pos..])?;
        pos += n2;

        let props_len = usize::try_from(size_of_props).map_err(|_| Error::Overflow {
            context: "filter props size",
        })?;
        if buf.len() < pos + props_len {
            return Err(Error::SizeMismatch {
                context: "filter props",
                expected: props_len as u64,
                actual: (buf.len() - pos) as u64,
            });
        }
        let props = buf[pos..pos + props_len].to_vec();
        pos += props_len;

        if id == LZMA2_FILTER_ID {
            if props.len() != 1 {
                return Err(Error::SizeMismatch {
                    context: "LZMA2 filter props size",
                    expected: 1,
                    actual: props.len() as u64,
                });
            }
            if props[0] & 0xC0 != 0 {
                return Err(Error::ReservedBitsSet {
                    context: "LZMA2 filter props",
                });
            }
        }

        filters.push(FilterEntry { id, props });
    }

    if buf.len() < pos + 4 {
        return Err(Error::SizeMismatch {
            context: "block header CRC",
            expected: 4,
            actual: (buf.len() - pos) as u64,
        });
    }
    let padding_end = buf.len() - 4;
    if buf[pos..padding_end].iter().any(|&b| b != 0) {
        return Err(Error::ReservedBitsSet {
            context: "block header padding",
        });
    }

    let stored_crc = u32::from_le_bytes(buf[padding_end..].try_into().unwrap());
    if stored_crc != crc32(&buf[..padding_end]) {
        return Err(Error::ChecksumError {
            context: "block header",
            offset,
        });
    }

    Ok(BlockHeader {
        header_size,
        compressed_size,
        uncompressed_size,
        filters,
    })
}
