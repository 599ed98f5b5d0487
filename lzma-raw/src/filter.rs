//! Filter chain types accepted by [`crate::decompress_raw`].

/// Marks the end of a filter chain passed to liblzma.
const LZMA_VLI_UNKNOWN: liblzma_sys::lzma_vli = u64::MAX;

/// `LZMA_FILTER_LZMA2` as defined by liblzma.
const LZMA_FILTER_LZMA2: liblzma_sys::lzma_vli = 0x21;

/// A single filter used when decoding a raw LZMA2 chunk.
///
/// Block headers may list filters this crate does not implement (BCJ
/// variants, delta). Those are represented in the higher-level frame types
/// but can never be turned into a [`Filter`], so a raw decode request is
/// always LZMA2-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// `LZMA_FILTER_LZMA2` with the dictionary size recorded in the block header.
    Lzma2 {
        /// Dictionary size in bytes, decoded from the block header's filter properties.
        dict_size: u32,
    },
}

/// An ordered chain of filters as stored in an XZ block header.
///
/// liblzma applies filters in the order they were used to encode, so this
/// chain is passed to `lzma_raw_decoder` unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    /// Create an empty filter chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to the end of the chain.
    pub fn push(&mut self, filter: Filter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Build the `lzma_filter` array liblzma expects, keeping the backing
    /// `lzma_options_lzma` storage alive alongside it.
    pub(crate) fn to_raw(&self) -> RawFilterChain {
        let mut filters = Vec::with_capacity(self.filters.len() + 1);
        let mut owned = Vec::with_capacity(self.filters.len());

        for filter in &self.filters {
            let Filter::Lzma2 { dict_size } = *filter;

            // SAFETY: lzma_options_lzma is a POD type; a zeroed value is a
            // valid baseline that liblzma's decoder only reads dict_size from.
            let mut opts: liblzma_sys::lzma_options_lzma = unsafe { std::mem::zeroed() };
            opts.dict_size = dict_size;
            let boxed = Box::new(opts);

            filters.push(liblzma_sys::lzma_filter {
                id: LZMA_FILTER_LZMA2,
                options: std::ptr::from_ref(boxed.as_ref()).cast_mut().cast(),
            });
            owned.push(boxed);
        }

        filters.push(liblzma_sys::lzma_filter {
            id: LZMA_VLI_UNKNOWN,
            options: std::ptr::null_mut(),
        });

        RawFilterChain { filters, owned }
    }
}

/// Owns the `lzma_filter` array and its backing option structs for the
/// duration of a single `lzma_raw_decoder` call.
pub(crate) struct RawFilterChain {
    filters: Vec<liblzma_sys::lzma_filter>,
    // Kept alive only so the pointers in `filters` stay valid; never read directly.
    #[allow(dead_code)]
    owned: Vec<Box<liblzma_sys::lzma_options_lzma>>,
}

impl RawFilterChain {
    pub(crate) fn as_ptr(&self) -> *const liblzma_sys::lzma_filter {
        self.filters.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_has_only_terminator() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        let raw = chain.to_raw();
        assert_eq!(raw.filters.len(), 1);
        assert_eq!(raw.filters[0].id, LZMA_VLI_UNKNOWN);
    }

    #[test]
    fn single_lzma2_filter_is_terminated() {
        let mut chain = FilterChain::new();
        chain.push(Filter::Lzma2 {
            dict_size: 1 << 20,
        });
        assert_eq!(chain.len(), 1);

        let raw = chain.to_raw();
        assert_eq!(raw.filters.len(), 2);
        assert_eq!(raw.filters[0].id, LZMA_FILTER_LZMA2);
        assert_eq!(raw.filters[1].id, LZMA_VLI_UNKNOWN);
        assert!(!raw.filters[0].options.is_null());

        // SAFETY: pointer was just built from the owned box above.
        let opts = unsafe { &*raw.filters[0].options.cast::<liblzma_sys::lzma_options_lzma>() };
        assert_eq!(opts.dict_size, 1 << 20);
    }
}
