//! Builds the block directory by walking XZ streams backward from EOF.
//!
//! XZ stores no forward index: each stream's index sits at its own tail so
//! that a random-access reader can discover block boundaries without
//! scanning compressed data. This module performs that backward walk once,
//! at open time, and hands back an immutable, binary-searchable directory.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::frame::{self, BlockHeader, CheckKind, ALIGNMENT, STREAM_HEADER_SIZE};

/// One independently decodable block, in ascending file order.
#[derive(Debug, Clone)]
pub struct BlockEntry {
    /// Absolute byte offset where the block header begins.
    pub file_offset: u64,
    /// Cumulative decompressed length preceding this block.
    pub uncomp_start: u64,
    /// Index-recorded size: header + compressed payload + check field, unpadded.
    pub unpadded_size: u64,
    /// Decompressed payload length.
    pub uncomp_size: u64,
    /// Integrity check algorithm of the owning stream.
    pub check_kind: CheckKind,
    /// Real size in bytes of this block's own header, `(encoded_size_byte + 1) * 4`.
    pub header_size: u64,
    /// Filter chain recorded in this block's header.
    pub filters: Vec<frame::FilterEntry>,
}

impl BlockEntry {
    /// Size in bytes of this block's trailing check field.
    pub fn check_size(&self) -> u64 {
        self.check_kind.check_size()
    }

    /// `unpadded_size` rounded up to the next multiple of 4.
    pub fn padded_size(&self) -> u64 {
        pad_to_alignment(self.unpadded_size)
    }

    /// Byte length of the compressed payload, excluding header and check field.
    pub fn compressed_payload_len(&self) -> u64 {
        self.unpadded_size - self.header_size - self.check_size()
    }
}

/// `unpadded_size`, `Header size` etc. are defined with ceil-to-4 padding throughout the format.
pub(crate) fn pad_to_alignment(size: u64) -> u64 {
    size + ((ALIGNMENT - size % ALIGNMENT) % ALIGNMENT)
}

/// Aggregate metadata about one XZ stream within the file.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Stream number (1-based, in file order).
    pub number: u64,
    /// Compressed start offset.
    pub compressed_offset: u64,
    /// Uncompressed start offset.
    pub uncompressed_offset: u64,
    /// On-disk size, header through footer, excluding trailing Stream Padding.
    pub compressed_size: u64,
    /// Sum of this stream's blocks' decompressed sizes.
    pub uncompressed_size: u64,
    /// Number of blocks in this stream.
    pub block_count: u64,
    /// Stream Padding bytes following this stream (0-3 bytes, always a multiple of 4 overall).
    pub padding: u64,
}

/// Per-block metadata as reported to callers (derived from [`BlockEntry`] plus
/// its position within the file and its owning stream).
#[derive(Debug, Clone)]
pub struct BlockInfo {
    /// Block number within its stream (1-based).
    pub number_in_stream: u64,
    /// Block number within the whole file (1-based).
    pub number_in_file: u64,
    /// Absolute offset of the block header.
    pub compressed_file_offset: u64,
    /// Absolute decompressed offset of the block's first byte.
    pub uncompressed_file_offset: u64,
    /// On-disk size including header, padding, and check field.
    pub total_size: u64,
    /// Decompressed size.
    pub uncompressed_size: u64,
    /// Index-recorded size, unpadded.
    pub unpadded_size: u64,
}

/// Immutable, binary-searchable map from decompressed offset to on-disk block.
pub struct Directory {
    /// Real blocks followed by one terminal sentinel entry.
    entries: Vec<BlockEntry>,
    /// One entry per XZ stream, in file order.
    streams: Vec<StreamEntry>,
    /// Number of XZ streams concatenated in the file.
    stream_count: u64,
    /// Uncompressed size of the largest block.
    max_block_uncomp: u64,
    /// Integrity check algorithm shared by every stream in the file.
    check_kind: CheckKind,
}

impl Directory {
    /// Total decompressed size of the file.
    pub fn total_uncomp(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.uncomp_start)
    }

    /// Total on-disk size of the file.
    pub fn total_file_size(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.file_offset)
    }

    /// Number of XZ streams concatenated in the file.
    pub fn stream_count(&self) -> u64 {
        self.stream_count
    }

    /// Number of real (non-sentinel) blocks.
    pub fn block_count(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    /// Uncompressed size of the largest block.
    pub fn max_block_uncomp(&self) -> u64 {
        self.max_block_uncomp
    }

    /// All entries, including the terminal sentinel.
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Integrity check algorithm shared by every stream in the file.
    pub fn check_kind(&self) -> CheckKind {
        self.check_kind
    }

    /// Per-stream aggregate metadata, in file order.
    pub fn streams(&self) -> &[StreamEntry] {
        &self.streams
    }

    /// Per-block metadata for every real (non-sentinel) block, in file order.
    pub fn blocks(&self) -> Vec<BlockInfo> {
        let mut out = Vec::with_capacity(self.block_count());
        let mut stream_iter = self.streams.iter();
        let mut current = stream_iter.next();
        let mut number_in_stream = 0u64;

        for (i, entry) in self.entries[..self.block_count()].iter().enumerate() {
            while current.is_some_and(|s| {
                entry.file_offset >= s.compressed_offset + s.compressed_size + s.padding
            }) {
                current = stream_iter.next();
                number_in_stream = 0;
            }
            number_in_stream += 1;

            out.push(BlockInfo {
                number_in_stream,
                number_in_file: i as u64 + 1,
                compressed_file_offset: entry.file_offset,
                uncompressed_file_offset: entry.uncomp_start,
                total_size: entry.padded_size(),
                uncompressed_size: entry.uncomp_size,
                unpadded_size: entry.unpadded_size,
            });
        }
        out
    }

    /// Index of the sentinel entry (one past the last real block).
    fn sentinel_index(&self) -> usize {
        self.entries.len() - 1
    }

    /// Locate the unique block `i` with `entries[i].uncomp_start <= offset < entries[i+1].uncomp_start`.
    ///
    /// `offset == total_uncomp()` resolves to the sentinel index.
    pub fn locate(&self, offset: u64) -> Option<usize> {
        if offset > self.total_uncomp() {
            return None;
        }
        if offset == self.total_uncomp() {
            return Some(self.sentinel_index());
        }

        // entries[..].uncomp_start is strictly increasing (zero-length blocks are
        // disallowed by the format), so partition_point gives the answer directly.
        let idx = self
            .entries
            .partition_point(|entry| entry.uncomp_start <= offset);
        Some(idx - 1)
    }
}

pub(crate) fn read_exact_at<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8]) -> Result<()> {
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(buf)?;
    Ok(())
}

fn read_stream_header_at<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<frame::StreamHeader> {
    let mut bytes = [0u8; STREAM_HEADER_SIZE];
    read_exact_at(reader, offset, &mut bytes)?;
    frame::parse_stream_header(&bytes, offset)
}

fn read_stream_footer_at<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<frame::StreamFooter> {
    let mut bytes = [0u8; STREAM_HEADER_SIZE];
    read_exact_at(reader, offset, &mut bytes)?;
    frame::parse_stream_footer(&bytes, offset)
}

/// Read and validate a block header at `file_offset` against the sizes recorded in its index record.
pub(crate) fn read_block_header_at<R: Read + Seek>(
    reader: &mut R,
    file_offset: u64,
    unpadded_size: u64,
    uncomp_size: u64,
    check_kind: CheckKind,
) -> Result<BlockHeader> {
    let mut size_byte = [0u8; 1];
    read_exact_at(reader, file_offset, &mut size_byte)?;
    let header_size = (u64::from(size_byte[0]) + 1) * ALIGNMENT;

    let mut header_bytes = vec![0u8; usize::try_from(header_size).unwrap_or(usize::MAX)];
    read_exact_at(reader, file_offset, &mut header_bytes)?;
    let header = frame::parse_block_header(&header_bytes, file_offset)?;

    let check_size = check_kind.check_size();
    if let Some(compressed_size) = header.compressed_size {
        let expected = unpadded_size
            .checked_sub(header.header_size)
            .and_then(|v| v.checked_sub(check_size))
            .ok_or(Error::SizeMismatch {
                context: "block compressed size (underflow)",
                expected: unpadded_size,
                actual: header.header_size + check_size,
            })?;
        if compressed_size != expected {
            return Err(Error::SizeMismatch {
                context: "block header compressed size",
                expected,
                actual: compressed_size,
            });
        }
    }
    if let Some(declared_uncomp) = header.uncompressed_size {
        if declared_uncomp != uncomp_size {
            return Err(Error::SizeMismatch {
                context: "block header uncompressed size",
                expected: uncomp_size,
                actual: declared_uncomp,
            });
        }
    }

    // Filter ids other than LZMA2 parse fine here; rejecting them is the
    // block fetcher's job, not the directory builder's.

    Ok(header)
}

/// Consume zero-padding bytes immediately preceding `pos`, returning the new
/// position (the end of the preceding Stream Footer) and the padding length.
fn consume_stream_padding<R: Read + Seek>(reader: &mut R, mut pos: u64) -> Result<u64> {
    while pos >= ALIGNMENT {
        let mut word = [0u8; 4];
        read_exact_at(reader, pos - ALIGNMENT, &mut word)?;
        if word == [0, 0, 0, 0] {
            pos -= ALIGNMENT;
        } else {
            break;
        }
    }
    Ok(pos)
}

/// Build the block directory by walking every stream in `reader` backward from EOF.
///
/// # Errors
///
/// Returns any [`Error`] raised while parsing stream headers/footers, stream
/// indices, or block headers, or [`Error::MixedChecksumStreams`] if streams
/// in this file declare different check kinds.
pub fn build<R: Read + Seek>(reader: &mut R) -> Result<Directory> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    let min_size = 2 * STREAM_HEADER_SIZE as u64;
    if file_size < min_size {
        return Err(Error::SizeMismatch {
            context: "file too small to hold a stream header and footer",
            expected: min_size,
            actual: file_size,
        });
    }

    let file_wide_check_kind = read_stream_header_at(reader, 0)?.check_kind;

    let mut blocks_rev: Vec<BlockEntry> = Vec::new();
    let mut streams_rev: Vec<StreamEntry> = Vec::new();
    let mut stream_count = 0u64;
    let mut cursor = file_size;

    while cursor > 0 {
        let footer_end = consume_stream_padding(reader, cursor)?;
        let trailing_padding = cursor - footer_end;
        if footer_end < STREAM_HEADER_SIZE as u64 {
            return Err(Error::SizeMismatch {
                context: "stream footer position",
                expected: STREAM_HEADER_SIZE as u64,
                actual: footer_end,
            });
        }

        let footer_start = footer_end - STREAM_HEADER_SIZE as u64;
        let footer = read_stream_footer_at(reader, footer_start)?;

        let index_start = footer_start
            .checked_sub(footer.index_size)
            .ok_or(Error::SizeMismatch {
                context: "stream index position",
                expected: footer.index_size,
                actual: footer_start,
            })?;
        let index_len = usize::try_from(footer.index_size).map_err(|_| Error::Overflow {
            context: "stream index size",
        })?;
        let mut index_bytes = vec![0u8; index_len];
        read_exact_at(reader, index_start, &mut index_bytes)?;
        let records = frame::parse_stream_index(&index_bytes, index_start)?;

        let mut stream_comp_size = 0u64;
        for record in records.iter().rev() {
            let padded_size = pad_to_alignment(record.unpadded_size);
            stream_comp_size += padded_size;
            let file_offset = index_start
                .checked_sub(stream_comp_size)
                .ok_or(Error::SizeMismatch {
                    context: "block file offset",
                    expected: stream_comp_size,
                    actual: index_start,
                })?;

            let header = read_block_header_at(
                reader,
                file_offset,
                record.unpadded_size,
                record.uncomp_size,
                footer.check_kind,
            )?;

            blocks_rev.push(BlockEntry {
                file_offset,
                uncomp_start: 0,
                unpadded_size: record.unpadded_size,
                uncomp_size: record.uncomp_size,
                check_kind: footer.check_kind,
                header_size: header.header_size,
                filters: header.filters,
            });
        }

        let stream_start = index_start
            .checked_sub(stream_comp_size)
            .and_then(|v| v.checked_sub(STREAM_HEADER_SIZE as u64))
            .ok_or(Error::SizeMismatch {
                context: "stream start position",
                expected: stream_comp_size + STREAM_HEADER_SIZE as u64,
                actual: index_start,
            })?;

        let header = read_stream_header_at(reader, stream_start)?;
        if header.check_kind != footer.check_kind {
            return Err(Error::ChecksumError {
                context: "stream header/footer flags mismatch",
                offset: stream_start,
            });
        }
        if header.check_kind != file_wide_check_kind {
            return Err(Error::MixedChecksumStreams);
        }

        streams_rev.push(StreamEntry {
            number: 0, // filled in after the reverse, once file order is known
            compressed_offset: stream_start,
            uncompressed_offset: 0,
            compressed_size: footer_end - stream_start,
            uncompressed_size: records.iter().map(|r| r.uncomp_size).sum(),
            block_count: records.len() as u64,
            padding: trailing_padding,
        });

        cursor = stream_start;
        stream_count += 1;
    }

    blocks_rev.reverse();
    streams_rev.reverse();

    let mut running = 0u64;
    let mut max_block_uncomp = 0u64;
    for entry in &mut blocks_rev {
        entry.uncomp_start = running;
        running += entry.uncomp_size;
        max_block_uncomp = max_block_uncomp.max(entry.uncomp_size);
    }

    let mut streams = streams_rev;
    let mut block_cursor = 0usize;
    for (i, stream) in streams.iter_mut().enumerate() {
        stream.number = i as u64 + 1;
        stream.uncompressed_offset = blocks_rev
            .get(block_cursor)
            .map_or(running, |b| b.uncomp_start);
        block_cursor += stream.block_count as usize;
    }

    let mut entries = blocks_rev;
    entries.push(BlockEntry {
        file_offset: file_size,
        uncomp_start: running,
        unpadded_size: 0,
        uncomp_size: 0,
        check_kind: file_wide_check_kind,
        header_size: 0,
        filters: Vec::new(),
    });

    Ok(Directory {
        entries,
        streams,
        stream_count,
        check_kind: file_wide_check_kind,
        max_block_uncomp,
    })
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
    fn builds_hello_directory() {
        let mut cursor = Cursor::new(HELLO_XZ);
        let dir = build(&mut cursor).unwrap();

        assert_eq!(dir.stream_count(), 1);
        assert_eq!(dir.block_count(), 1);
        assert_eq!(dir.max_block_uncomp(), 5);
        assert_eq!(dir.total_uncomp(), 5);
        assert_eq!(dir.total_file_size(), 64);

        let block = &dir.entries()[0];
        assert_eq!(block.file_offset, 12);
        assert_eq!(block.uncomp_start, 0);
        assert_eq!(block.unpadded_size, 29);
        assert!(matches!(block.check_kind, CheckKind::Crc64));

        let sentinel = &dir.entries()[1];
        assert_eq!(sentinel.file_offset, 64);
        assert_eq!(sentinel.uncomp_start, 5);
    }

    #[test]
    fn locate_finds_owning_block() {
        let mut cursor = Cursor::new(HELLO_XZ);
        let dir = build(&mut cursor).unwrap();

        assert_eq!(dir.locate(0), Some(0));
        assert_eq!(dir.locate(4), Some(0));
        assert_eq!(dir.locate(5), Some(1)); // sentinel, EOF
        assert_eq!(dir.locate(6), None);
    }

    #[test]
    fn rejects_truncated_file() {
        let mut cursor = Cursor::new(&HELLO_XZ[..8]);
        let err = build(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn reports_stream_and_block_metadata() {
        let mut cursor = Cursor::new(HELLO_XZ);
        let dir = build(&mut cursor).unwrap();

        assert_eq!(dir.check_kind(), CheckKind::Crc64);

        let streams = dir.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].number, 1);
        assert_eq!(streams[0].compressed_offset, 0);
        assert_eq!(streams[0].uncompressed_offset, 0);
        assert_eq!(streams[0].uncompressed_size, 5);
        assert_eq!(streams[0].block_count, 1);
        assert_eq!(streams[0].padding, 0);

        let blocks = dir.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number_in_stream, 1);
        assert_eq!(blocks[0].number_in_file, 1);
        assert_eq!(blocks[0].compressed_file_offset, 12);
        assert_eq!(blocks[0].uncompressed_file_offset, 0);
        assert_eq!(blocks[0].uncompressed_size, 5);
    }

    #[test]
    fn rejects_corrupted_index_crc() {
        let mut bytes = HELLO_XZ;
        bytes[49] ^= 0xFF; // inside the stream index CRC32
        let mut cursor = Cursor::new(bytes);
        let err = build(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::ChecksumError { .. }));
    }

    // Two concatenated single-block CRC32 streams: `xz` followed by `cat`.
    const CONCATENATED_STREAMS_XZ: [u8; 192] = [
        0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x01, 0x69, 0x22, 0xDE, 0x36, 0x02, 0x00, 0x21,
        0x01, 0x16, 0x00, 0x00, 0x00, 0x74, 0x2F, 0xE5, 0xA3, 0xE0, 0x00, 0x59, 0x00, 0x25, 0x5D,
        0x00, 0x29, 0x9D, 0x0A, 0x46, 0x66, 0xDD, 0xD2, 0x24, 0x21, 0x76, 0xE7, 0x80, 0x13, 0xEB,
        0xC9, 0xE3, 0xC3, 0x5C, 0x67, 0x9C, 0xE7, 0x80, 0x72, 0x33, 0x23, 0x21, 0x85, 0x63, 0x54,
        0xC0, 0xD3, 0x1C, 0x67, 0xCA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB6, 0x70, 0x8D,
        0xF0, 0x00, 0x01, 0x3D, 0x5A, 0x7F, 0x45, 0xD0, 0xC1, 0x90, 0x42, 0x99, 0x0D, 0x01, 0x00,
        0x00, 0x00, 0x00, 0x01, 0x59, 0x5A, 0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x01, 0x69,
        0x22, 0xDE, 0x36, 0x02, 0x00, 0x21, 0x01, 0x16, 0x00, 0x00, 0x00, 0x74, 0x2F, 0xE5, 0xA3,
        0xE0, 0x00, 0x3D, 0x00, 0x26, 0x5D, 0x00, 0x29, 0x99, 0x48, 0x67, 0x22, 0x8D, 0xE8, 0xB9,
        0x11, 0xE3, 0xB1, 0xA2, 0x59, 0xF8, 0x9C, 0xFB, 0x17, 0xB1, 0x7F, 0x2D, 0xE1, 0x70, 0x8A,
        0x80, 0x54, 0x9F, 0x0F, 0x5D, 0x55, 0x6B, 0x5A, 0x43, 0x80, 0x25, 0x51, 0x41, 0x80, 0x00,
        0x00, 0x00, 0x00, 0x8C, 0xF4, 0x34, 0xEB, 0x00, 0x01, 0x3E, 0x3E, 0xFD, 0xB3, 0x22, 0xA0,
        0x90, 0x42, 0x99, 0x0D, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x59, 0x5A,
    ];

    #[test]
    fn builds_directory_across_concatenated_streams() {
        let mut cursor = Cursor::new(CONCATENATED_STREAMS_XZ);
        let dir = build(&mut cursor).unwrap();

        assert_eq!(dir.stream_count(), 2);
        assert_eq!(dir.block_count(), 2);
        assert_eq!(dir.total_uncomp(), 152);

        let streams = dir.streams();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].number, 1);
        assert_eq!(streams[0].uncompressed_offset, 0);
        assert_eq!(streams[0].uncompressed_size, 90);
        assert_eq!(streams[1].number, 2);
        assert_eq!(streams[1].uncompressed_offset, 90);
        assert_eq!(streams[1].uncompressed_size, 62);

        assert_eq!(dir.locate(0), Some(0));
        assert_eq!(dir.locate(89), Some(0));
        assert_eq!(dir.locate(90), Some(1));
        assert_eq!(dir.locate(151), Some(1));
    }
}
