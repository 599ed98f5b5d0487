//! The random-access reader façade: [`XzReader`] and its [`ReaderOptions`].

use std::io::{self, Read, Seek, SeekFrom};

use crate::cache::BlockCache;
use crate::directory::{self, BlockInfo, Directory, StreamEntry};
use crate::error::{Error, Result};
use crate::fetch;
use crate::frame::CheckKind;

/// Tuning knobs accepted by [`XzReader::open`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    verify_checks: bool,
    max_cache: usize,
    max_block_size: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            verify_checks: true,
            max_cache: 100,
            max_block_size: 100_000,
        }
    }
}

impl ReaderOptions {
    /// Start from the defaults: check verification on, 100 cached blocks,
    /// a 100000-byte ceiling on any single block's uncompressed size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify each block's trailing CRC32/CRC64 check field after decompression.
    /// Has no effect for streams whose check kind is None or SHA-256.
    pub fn with_verify_checks(mut self, verify_checks: bool) -> Self {
        self.verify_checks = verify_checks;
        self
    }

    /// Maximum number of decompressed blocks held in the LRU cache.
    pub fn with_max_cache(mut self, max_cache: usize) -> Self {
        self.max_cache = max_cache;
        self
    }

    /// Reject files whose largest block decompresses past this many bytes.
    pub fn with_max_block_size(mut self, max_block_size: u64) -> Self {
        self.max_block_size = max_block_size;
        self
    }
}

/// A random-access reader over the decompressed contents of one or more
/// concatenated XZ streams.
///
/// Opening walks the file's stream indices backward from EOF to build a
/// block directory (see [`crate::directory`]); no block is decompressed
/// until a read actually touches it, and decompressed blocks are cached
/// under an LRU policy bounded by [`ReaderOptions::with_max_cache`].
pub struct XzReader<R> {
    inner: R,
    directory: Directory,
    cache: BlockCache,
    verify_checks: bool,
    position: u64,
}

impl<R: Read + Seek> XzReader<R> {
    /// Build the block directory and return a reader positioned at offset 0.
    ///
    /// # Errors
    ///
    /// Returns any [`Error`] raised while walking the container,
    /// [`Error::InvalidOption`] if `options.max_cache` is 0, or
    /// [`Error::BlockTooLarge`] if the largest block exceeds
    /// `options.max_block_size`.
    pub fn open(mut inner: R, options: ReaderOptions) -> Result<Self> {
        if options.max_cache < 1 {
            return Err(Error::InvalidOption(
                "max_cache must be at least 1".to_string(),
            ));
        }

        let directory = directory::build(&mut inner)?;
        // A zero ceiling means "no limit", matching the original reader's
        // validation, which only ever rejected a negative value.
        if options.max_block_size != 0 && directory.max_block_uncomp() > options.max_block_size {
            return Err(Error::BlockTooLarge {
                max_block_uncomp: directory.max_block_uncomp(),
                max_block_size: options.max_block_size,
            });
        }

        Ok(Self {
            inner,
            directory,
            cache: BlockCache::new(options.max_cache),
            verify_checks: options.verify_checks,
            position: 0,
        })
    }

    /// Current position in the decompressed stream.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Total decompressed size of the file.
    pub fn len(&self) -> u64 {
        self.directory.total_uncomp()
    }

    /// Whether the decompressed stream is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of XZ streams concatenated in the underlying file.
    pub fn stream_count(&self) -> u64 {
        self.directory.stream_count()
    }

    /// Number of independently decodable blocks across all streams.
    pub fn block_count(&self) -> usize {
        self.directory.block_count()
    }

    /// Total decompressed size of the file (alias of [`Self::len`], matching
    /// the original reader's naming).
    pub fn uncompressed_size(&self) -> u64 {
        self.directory.total_uncomp()
    }

    /// Total on-disk size of the file.
    pub fn compressed_size(&self) -> u64 {
        self.directory.total_file_size()
    }

    /// Integrity check algorithm shared by every stream in the file.
    pub fn check_kind(&self) -> CheckKind {
        self.directory.check_kind()
    }

    /// Per-stream aggregate metadata, in file order.
    pub fn streams(&self) -> &[StreamEntry] {
        self.directory.streams()
    }

    /// Per-block metadata for every block in the file, in file order.
    pub fn blocks(&self) -> Vec<BlockInfo> {
        self.directory.blocks()
    }

    /// Always `true`: every opened reader supports seeking, since the
    /// directory is built eagerly at open time.
    pub fn seekable(&self) -> bool {
        true
    }

    /// Drop cached blocks and return the wrapped reader.
    pub fn close(mut self) -> R {
        self.cache.clear();
        self.inner
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() && self.position < self.directory.total_uncomp() {
            let block_index = self
                .directory
                .locate(self.position)
                .expect("position is kept within [0, total_uncomp]");
            let entry = self.directory.entries()[block_index].clone();
            if entry.uncomp_size == 0 {
                break; // sentinel entry: nothing left to read
            }

            if self.cache.get(block_index).is_none() {
                let data = fetch::fetch_block(&mut self.inner, &entry, self.verify_checks)?;
                self.cache.insert(block_index, data);
            }
            let block = self
                .cache
                .get(block_index)
                .expect("just inserted into the cache");

            let offset_in_block = (self.position - entry.uncomp_start) as usize;
            let available = block.len() - offset_in_block;
            let take = available.min(buf.len() - written);
            buf[written..written + take]
                .copy_from_slice(&block[offset_in_block..offset_in_block + take]);

            written += take;
            self.position += take as u64;
        }
        Ok(written)
    }
}

impl<R: Read + Seek> Read for XzReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.fill(buf)?)
    }
}

impl<R: Read + Seek> Seek for XzReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let total = i64::try_from(self.directory.total_uncomp()).unwrap_or(i64::MAX);
        let current = i64::try_from(self.position).unwrap_or(i64::MAX);

        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).ok(),
            SeekFrom::End(delta) => total.checked_add(delta),
            SeekFrom::Current(delta) => current.checked_add(delta),
        };
        let target = target.ok_or(Error::InvalidSeek { offset: i64::MIN })?;

        if target < 0 || target as u64 > self.directory.total_uncomp() {
            return Err(Error::InvalidSeek { offset: target }.into());
        }

        self.position = target as u64;
        Ok(self.position)
    }
}

#[cfg(unix)]
impl<R: Read + Seek + std::os::unix::io::AsRawFd> XzReader<R> {
    /// The underlying file descriptor, for callers that need it directly.
    pub fn fileno(&self) -> std::os::unix::io::RawFd {
        self.inner.as_raw_fd()
    }

    /// Always `false`: a decompressed XZ stream is never a terminal.
    pub fn isatty(&self) -> bool {
        false
    }
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
    fn reads_full_contents() {
        let mut reader = XzReader::open(Cursor::new(HELLO_XZ), ReaderOptions::new()).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"Hello");
        assert_eq!(reader.tell(), 5);
        assert_eq!(reader.len(), 5);
    }

    #[test]
    fn reads_in_small_chunks() {
        let mut reader = XzReader::open(Cursor::new(HELLO_XZ), ReaderOptions::new()).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"He");
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ll");
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], b"o");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_and_read_from_middle() {
        let mut reader = XzReader::open(Cursor::new(HELLO_XZ), ReaderOptions::new()).unwrap();
        reader.seek(SeekFrom::Start(3)).unwrap();
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"lo");
    }

    #[test]
    fn seek_past_end_is_rejected() {
        let mut reader = XzReader::open(Cursor::new(HELLO_XZ), ReaderOptions::new()).unwrap();
        let err = reader.seek(SeekFrom::Start(6)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn rejects_block_larger_than_ceiling() {
        let options = ReaderOptions::new().with_max_block_size(4);
        let err = XzReader::open(Cursor::new(HELLO_XZ), options).unwrap_err();
        assert!(matches!(err, Error::BlockTooLarge { .. }));
    }

    #[test]
    fn zero_max_block_size_means_unlimited() {
        let options = ReaderOptions::new().with_max_block_size(0);
        XzReader::open(Cursor::new(HELLO_XZ), options).unwrap();
    }

    #[test]
    fn rejects_zero_max_cache() {
        let options = ReaderOptions::new().with_max_cache(0);
        let err = XzReader::open(Cursor::new(HELLO_XZ), options).unwrap_err();
        assert!(matches!(err, Error::InvalidOption(_)));
    }

    #[test]
    fn reports_metadata() {
        let reader = XzReader::open(Cursor::new(HELLO_XZ), ReaderOptions::new()).unwrap();
        assert_eq!(reader.uncompressed_size(), 5);
        assert_eq!(reader.compressed_size(), 64);
        assert_eq!(reader.check_kind(), crate::frame::CheckKind::Crc64);
        assert_eq!(reader.streams().len(), 1);
        assert_eq!(reader.blocks().len(), 1);
    }

    // One CRC32 stream, three 300-byte blocks of `(b"The quick brown fox
    // jumps over the lazy dog. " * 20)` repeated, produced by
    // `xz --block-size=300 --check=crc32`.
    const MULTI_BLOCK_XZ: [u8; 268] = [
        0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x01, 0x69, 0x22, 0xDE, 0x36, 0x02, 0x00, 0x21,
        0x01, 0x08, 0x00, 0x00, 0x00, 0xD8, 0x0F, 0x23, 0x13, 0xE0, 0x01, 0x2B, 0x00, 0x33, 0x5D,
        0x00, 0x2A, 0x1A, 0x08, 0xA2, 0x03, 0x25, 0x66, 0xF1, 0x4B, 0x78, 0xC5, 0xA2, 0x05, 0xFF,
        0x2E, 0xE6, 0xD9, 0xD2, 0x20, 0x1A, 0xAD, 0x34, 0xF8, 0xE2, 0x1D, 0xE8, 0x41, 0x36, 0xFA,
        0xDC, 0x06, 0x69, 0xBB, 0x3C, 0xE4, 0x10, 0x34, 0x27, 0x09, 0xEB, 0xB3, 0x66, 0xE3, 0xED,
        0x37, 0x92, 0xD3, 0xC5, 0x61, 0x80, 0x00, 0x00, 0x00, 0x2F, 0x52, 0xB2, 0xD1, 0x02, 0x00,
        0x21, 0x01, 0x08, 0x00, 0x00, 0x00, 0xD8, 0x0F, 0x23, 0x13, 0xE0, 0x01, 0x2B, 0x00, 0x33,
        0x5D, 0x00, 0x10, 0x1D, 0x09, 0x06, 0x67, 0x42, 0x5A, 0x18, 0x89, 0xDA, 0xCC, 0xFE, 0xE1,
        0xAA, 0xD3, 0xEE, 0xCB, 0xEA, 0xCC, 0x5F, 0x73, 0x29, 0xF8, 0x5F, 0x89, 0x5B, 0x1E, 0x8B,
        0xB0, 0x20, 0x28, 0x58, 0x6B, 0x35, 0x94, 0x96, 0xF1, 0x53, 0xD2, 0x67, 0xF6, 0xC0, 0xF3,
        0x28, 0x62, 0x82, 0x66, 0x85, 0x58, 0x00, 0x00, 0x00, 0x00, 0x99, 0xBD, 0x0D, 0xCD, 0x02,
        0x00, 0x21, 0x01, 0x08, 0x00, 0x00, 0x00, 0xD8, 0x0F, 0x23, 0x13, 0xE0, 0x01, 0x2B, 0x00,
        0x33, 0x5D, 0x00, 0x10, 0x19, 0x89, 0xE7, 0xB9, 0x17, 0x5D, 0x71, 0x95, 0x90, 0x80, 0xFD,
        0x36, 0xF0, 0x46, 0xFA, 0x9C, 0x80, 0x5D, 0xE3, 0x6A, 0xC4, 0x2E, 0x1D, 0xC0, 0x54, 0xC8,
        0x1E, 0x12, 0x83, 0x53, 0x70, 0x91, 0x64, 0xCE, 0xCB, 0xB2, 0xCB, 0xB7, 0xCE, 0xFF, 0x58,
        0x89, 0xA3, 0xBC, 0x7B, 0x49, 0xC2, 0x74, 0x00, 0x00, 0x00, 0x00, 0x15, 0x24, 0x1F, 0x14,
        0x00, 0x03, 0x4B, 0xAC, 0x02, 0x4B, 0xAC, 0x02, 0x4B, 0xAC, 0x02, 0x00, 0x70, 0x90, 0x8B,
        0x38, 0x9B, 0xE3, 0x51, 0x40, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01, 0x59, 0x5A,
    ];

    fn multi_block_plaintext() -> Vec<u8> {
        b"The quick brown fox jumps over the lazy dog. "
            .repeat(20)
    }

    #[test]
    fn reads_across_multiple_blocks_in_one_stream() {
        let mut reader =
            XzReader::open(Cursor::new(MULTI_BLOCK_XZ), ReaderOptions::new()).unwrap();
        assert_eq!(reader.block_count(), 3);
        assert_eq!(reader.stream_count(), 1);
        assert_eq!(reader.uncompressed_size(), 900);

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, multi_block_plaintext());
    }

    #[test]
    fn seeks_across_block_boundaries() {
        let mut reader =
            XzReader::open(Cursor::new(MULTI_BLOCK_XZ), ReaderOptions::new()).unwrap();
        let expected = multi_block_plaintext();

        // Offset 290..310 straddles the boundary between block 0 and block 1.
        reader.seek(SeekFrom::Start(290)).unwrap();
        let mut buf = [0u8; 20];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &expected[290..310]);
    }

    #[test]
    fn repeated_reads_reuse_the_cache() {
        let mut reader =
            XzReader::open(Cursor::new(MULTI_BLOCK_XZ), ReaderOptions::new()).unwrap();
        let expected = multi_block_plaintext();

        let mut first = [0u8; 10];
        reader.seek(SeekFrom::Start(0)).unwrap();
        reader.read_exact(&mut first).unwrap();

        reader.seek(SeekFrom::Start(600)).unwrap();
        let mut third_block = [0u8; 10];
        reader.read_exact(&mut third_block).unwrap();
        assert_eq!(&third_block, &expected[600..610]);

        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut first_again = [0u8; 10];
        reader.read_exact(&mut first_again).unwrap();
        assert_eq!(first, first_again);
    }
}
