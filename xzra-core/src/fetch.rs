//! Fetches and decompresses a single block named by a [`BlockEntry`].

use std::io::{Read, Seek};

use lzma_raw::{Filter, FilterChain};

use crate::crc32::crc32;
use crate::crc64::crc64;
use crate::directory::{pad_to_alignment, read_exact_at, BlockEntry};
use crate::error::{Error, Result};
use crate::frame::{CheckKind, LZMA2_FILTER_ID};
use crate::lzma2::decode_dict_size;

fn build_filter_chain(entry: &BlockEntry) -> Result<FilterChain> {
    if entry.filters.len() != 1 || entry.filters[0].id != LZMA2_FILTER_ID {
        let filter_id = entry.filters.first().map_or(0, |f| f.id);
        return Err(Error::UnsupportedFilter { filter_id });
    }

    let props = &entry.filters[0].props;
    let dict_size = decode_dict_size(props[0] & 0x3F)?;

    let mut chain = FilterChain::new();
    chain.push(Filter::Lzma2 { dict_size });
    Ok(chain)
}

fn verify_check_field(check_kind: CheckKind, field: &[u8], payload: &[u8], offset: u64) -> Result<()> {
    match check_kind {
        CheckKind::None | CheckKind::Sha256 => Ok(()),
        CheckKind::Crc32 => {
            let stored = u32::from_le_bytes(field.try_into().unwrap());
            if stored == crc32(payload) {
                Ok(())
            } else {
                Err(Error::ChecksumError {
                    context: "block check field",
                    offset,
                })
            }
        }
        CheckKind::Crc64 => {
            let stored = u64::from_le_bytes(field.try_into().unwrap());
            if stored == crc64(payload) {
                Ok(())
            } else {
                Err(Error::ChecksumError {
                    context: "block check field",
                    offset,
                })
            }
        }
    }
}

/// Read, decompress, and (optionally) integrity-check the block described by `entry`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFilter`] if the block's filter chain isn't a
/// lone LZMA2 filter, [`Error::Decompress`] if the backend rejects the
/// compressed payload, [`Error::SizeMismatch`] if the decompressed length
/// disagrees with the index, and [`Error::ChecksumError`] if `verify_checks`
/// is set and the trailing check field doesn't match.
pub fn fetch_block<R: Read + Seek>(
    reader: &mut R,
    entry: &BlockEntry,
    verify_checks: bool,
) -> Result<Vec<u8>> {
    let chain = build_filter_chain(entry)?;

    let payload_len = usize::try_from(entry.compressed_payload_len()).map_err(|_| {
        Error::Overflow {
            context: "compressed payload length",
        }
    })?;
    let payload_offset = entry.file_offset + entry.header_size;
    let mut payload = vec![0u8; payload_len];
    read_exact_at(reader, payload_offset, &mut payload)?;

    // Block Padding aligns (header + compressed data) to 4 bytes and sits
    // ahead of the check field, not after it.
    let pre_check_len = entry.header_size + payload_len as u64;
    let padded_pre_check_len = pad_to_alignment(pre_check_len);
    let padding_len = usize::try_from(padded_pre_check_len - pre_check_len).unwrap_or(0);
    if padding_len > 0 {
        let padding_offset = entry.file_offset + pre_check_len;
        let mut padding = vec![0u8; padding_len];
        read_exact_at(reader, padding_offset, &mut padding)?;
        if padding.iter().any(|&b| b != 0) {
            return Err(Error::ReservedBitsSet {
                context: "block padding",
            });
        }
    }

    let check_size = usize::try_from(entry.check_size()).unwrap_or(0);
    let mut check_field = vec![0u8; check_size];
    if check_size > 0 {
        let check_offset = entry.file_offset + padded_pre_check_len;
        read_exact_at(reader, check_offset, &mut check_field)?;
    }

    let uncomp_len = usize::try_from(entry.uncomp_size).map_err(|_| Error::Overflow {
        context: "block uncompressed length",
    })?;
    let output =
        lzma_raw::decompress_raw(&payload, uncomp_len, &chain).map_err(Error::Decompress)?;

    if output.len() as u64 != entry.uncomp_size {
        return Err(Error::SizeMismatch {
            context: "decompressed block length",
            expected: entry.uncomp_size,
            actual: output.len() as u64,
        });
    }

    if verify_checks {
        verify_check_field(
            entry.check_kind,
            &check_field,
            &output,
            entry.file_offset + padded_pre_check_len,
        )?;
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HELLO_XZ: [u8; 64] = [
        0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x04, 0xE6, 0xD6, 0xB4, 0x46, 0x02, 0x00, 0x21,
        0x01, 0x16, 0x00, 0x00, 0x00, 0x74, 0x2F, 0xE5, 0xA3, 0x01, 0x00, 0x04, 0x48, 0x65, 0x6C,
        0x6C, 0x6F, 0x00, 0x00, 0x00, 0x00, 0xC8, 0xAC, 0x7B, 0xC8, 0x3B, 0x5C, 0xCF, 0x51, 0x00,
        0x01, 0x1D, 0x05, 0xB8, 0x2D, 0x80, 0xAF, 0x1F, 0xB6, 0xF3, 0x7D, 0x01, 0x00, 0x00, 0x00,
        0x00, 0x04, 0x59, 0x5A,
    ];

    #[test]
    fn fetches_hello_block() {
        let mut cursor = Cursor::new(HELLO_XZ);
        let dir = crate::directory::build(&mut cursor).unwrap();
        let entry = &dir.entries()[0];

        let data = fetch_block(&mut cursor, entry, true).unwrap();
        assert_eq!(data, b"Hello");
    }

    #[test]
    fn rejects_unsupported_filter() {
        let mut entry_filters = vec![crate::frame::FilterEntry {
            id: 0x03, // delta filter, never supported by this reader
            props: vec![0x00],
        }];
        let entry = BlockEntry {
            file_offset: 0,
            uncomp_start: 0,
            unpadded_size: 0,
            uncomp_size: 0,
            check_kind: CheckKind::None,
            header_size: 0,
            filters: std::mem::take(&mut entry_filters),
        };
        let err = build_filter_chain(&entry).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFilter { .. }));
    }
}
