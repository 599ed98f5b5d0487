//! Safe FFI binding to liblzma's raw decoder.
//!
//! This crate exposes a single entry point, [`decompress_raw`], that feeds a
//! filter-encoded chunk of bytes (the payload of one XZ block) through
//! liblzma's `lzma_raw_decoder` and returns the decompressed bytes. It does
//! not understand the XZ container format itself — parsing stream headers,
//! block headers and indices is the caller's job.
//!
//! ```no_run
//! use lzma_raw::{decompress_raw, Filter, FilterChain};
//!
//! let mut filters = FilterChain::new();
//! filters.push(Filter::Lzma2 { dict_size: 1 << 20 });
//!
//! let compressed: &[u8] = &[/* raw LZMA2 chunk */];
//! let decompressed = decompress_raw(compressed, 4096, &filters)?;
//! # Ok::<(), lzma_raw::Error>(())
//! ```

mod error;
mod ffi;
mod filter;
mod stream;

pub use error::{Error, Result};
pub use filter::{Filter, FilterChain};
use stream::{Action, Stream};

/// Chunk size used to grow the output buffer when `expected_output_len` runs short.
const GROWTH_STEP: usize = 64 * 1024;

/// Decode a single filter-encoded chunk (an XZ block's compressed payload).
///
/// `expected_output_len` should be the uncompressed size recorded for this
/// block; it sizes the initial output buffer but is not trusted as a hard
/// limit; the buffer grows if liblzma produces more.
///
/// # Errors
///
/// Returns [`Error::DataError`] if `input` is corrupt, [`Error::OptionsError`]
/// if `filters` describes an unsupported configuration, or another [`Error`]
/// variant for the underlying liblzma failure.
pub fn decompress_raw(
    input: &[u8],
    expected_output_len: usize,
    filters: &FilterChain,
) -> Result<Vec<u8>> {
    let mut stream = Stream::default();
    ffi::lzma_raw_decoder(filters, &mut stream)?;

    let mut output = vec![0u8; expected_output_len.max(GROWTH_STEP)];
    let mut produced = 0usize;
    let mut remaining_input = input;

    let result = loop {
        if produced == output.len() {
            output.resize(output.len() + GROWTH_STEP, 0);
        }

        stream.set_next_input(remaining_input);
        let action = if remaining_input.is_empty() {
            Action::Finish
        } else {
            Action::Run
        };

        let before_out = stream.total_out();
        let code_result = {
            let out_slice = &mut output[produced..];
            stream.set_next_out(out_slice);
            ffi::lzma_code(&mut stream, action)
        };
        let consumed = remaining_input.len() - stream.avail_in();
        remaining_input = &remaining_input[consumed..];
        produced += usize::try_from(stream.total_out() - before_out).unwrap_or(0);

        match code_result {
            Ok(()) => {}
            Err(Error::StreamEnd) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    stream.finish();
    result?;

    output.truncate(produced);
    Ok(output)
}
