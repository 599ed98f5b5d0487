//! Thin owner of a zero-initialised `lzma_stream`, used for one-shot raw decodes.

use std::ptr;
use std::sync::Arc;

mod allocator;

pub use allocator::{Allocator, LzmaAllocator, StdAllocator};

/// Action passed to `lzma_code`. Only the two variants a raw decode loop
/// needs are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// `LZMA_RUN`: keep feeding input, more may follow.
    Run,
    /// `LZMA_FINISH`: this is the last chunk of input.
    Finish,
}

impl From<Action> for liblzma_sys::lzma_action {
    fn from(action: Action) -> Self {
        match action {
            Action::Run => liblzma_sys::lzma_action_LZMA_RUN,
            Action::Finish => liblzma_sys::lzma_action_LZMA_FINISH,
        }
    }
}

/// Safe owner of a raw `lzma_stream`, with an optional custom allocator.
pub struct Stream {
    /// The raw `lzma_stream` struct from liblzma.
    inner: liblzma_sys::lzma_stream,
    /// Optional custom allocator, kept alive for the stream's lifetime.
    #[allow(unused)]
    allocator: Option<LzmaAllocator>,
}

impl Default for Stream {
    fn default() -> Self {
        Self::with_allocator(None)
    }
}

impl Stream {
    /// Create a new `Stream` with an optional custom allocator.
    pub fn with_allocator(allocator: Option<Arc<dyn Allocator>>) -> Self {
        let allocator = allocator.map(LzmaAllocator::from_allocator);
        let allocator_ptr = allocator
            .as_ref()
            .map_or(std::ptr::null(), allocator::LzmaAllocator::as_ptr);

        // Initialize the lzma_stream struct with all fields set to zero or null,
        // except for the allocator pointer and reserved enums.
        let inner = liblzma_sys::lzma_stream {
            next_in: ptr::null(),
            avail_in: 0,
            total_in: 0,
            next_out: ptr::null_mut(),
            avail_out: 0,
            total_out: 0,
            allocator: allocator_ptr,
            internal: ptr::null_mut(),
            reserved_ptr1: ptr::null_mut(),
            reserved_ptr2: ptr::null_mut(),
            reserved_ptr3: ptr::null_mut(),
            reserved_ptr4: ptr::null_mut(),
            seek_pos: 0,
            reserved_int2: 0,
            reserved_int3: 0,
            reserved_int4: 0,
            reserved_enum1: liblzma_sys::lzma_reserved_enum_LZMA_RESERVED_ENUM,
            reserved_enum2: liblzma_sys::lzma_reserved_enum_LZMA_RESERVED_ENUM,
        };

        Self { inner, allocator }
    }

    /// Internal helper exposing the raw `lzma_stream`.
    pub(crate) fn lzma_stream(&mut self) -> &mut liblzma_sys::lzma_stream {
        &mut self.inner
    }

    /// Finalise the stream by calling into liblzma.
    pub(crate) fn finish(self) {
        crate::ffi::lzma_end(self);
    }

    /// Update the input buffer.
    pub(crate) fn set_next_input(&mut self, input: &[u8]) {
        let next_in = if input.is_empty() {
            std::ptr::null()
        } else {
            input.as_ptr()
        };

        self.inner.next_in = next_in;
        self.inner.avail_in = input.len();
    }

    /// Update the output buffer.
    pub(crate) fn set_next_out(&mut self, output: &mut [u8]) {
        let next_out = if output.is_empty() {
            std::ptr::null_mut()
        } else {
            output.as_mut_ptr()
        };

        self.inner.next_out = next_out;
        self.inner.avail_out = output.len();
    }

    /// Total number of output bytes produced so far.
    pub(crate) fn total_out(&self) -> u64 {
        self.inner.total_out
    }

    /// Remaining bytes in the current input buffer.
    pub(crate) fn avail_in(&self) -> usize {
        self.inner.avail_in
    }

    /// Remaining space in the current output buffer.
    pub(crate) fn avail_out(&self) -> usize {
        self.inner.avail_out
    }
}
