//! LZMA2 dictionary-size decoding from the 6-bit field stored in a block header filter.

use crate::error::{Error, Result};

/// Decode the dictionary size encoded in the low 6 bits of an LZMA2 filter property byte.
///
/// # Errors
///
/// Returns [`Error::Overflow`] if `bits > 40`.
pub fn decode_dict_size(bits: u8) -> Result<u32> {
    match bits {
        40 => Ok(0xFFFF_FFFF),
        0..=39 => {
            let bits = u32::from(bits);
            Ok((2 | (bits & 1)) << (bits / 2 + 11))
        }
        _ => Err(Error::Overflow {
            context: "LZMA2 dict size",
        }),
    }
}
