//! Thin wrappers around the `liblzma` FFI calls used by the raw decoder.

use crate::error::{result_from_lzma_ret, Result};
use crate::filter::FilterChain;
use crate::stream::{Action, Stream};

/// Call `lzma_code` with a safe return type.
pub(crate) fn lzma_code(stream: &mut Stream, action: Action) -> Result<()> {
    // SAFETY: The stream is assumed to be valid and initialized by liblzma.
    let ret = unsafe { liblzma_sys::lzma_code(stream.lzma_stream(), action.into()) };
    result_from_lzma_ret(ret, ())
}

/// Finalise a stream by calling `lzma_end`.
pub(crate) fn lzma_end(mut stream: Stream) {
    // SAFETY: The stream is valid and initialized by liblzma.
    // This function can only be called once per stream due to move semantics.
    unsafe { liblzma_sys::lzma_end(stream.lzma_stream()) };
}

/// Initialise a raw decoder via `lzma_raw_decoder`.
///
/// Unlike `lzma_stream_decoder`, this bypasses the XZ container entirely and
/// decodes a bare filter-encoded chunk using the caller-supplied filter
/// chain, which is exactly what an XZ block's payload is.
pub(crate) fn lzma_raw_decoder(filters: &FilterChain, stream: &mut Stream) -> Result<()> {
    let raw = filters.to_raw();
    // SAFETY: The stream must be valid and not already initialized. `raw`'s
    // filter array and option structs outlive this call.
    let ret = unsafe { liblzma_sys::lzma_raw_decoder(stream.lzma_stream(), raw.as_ptr()) };
    result_from_lzma_ret(ret, ())
}
