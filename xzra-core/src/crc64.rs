//! CRC64 over the reflected ECMA-182 polynomial, as used by XZ's CRC64 check.

const POLY: u64 = 0xC96C_5795_D787_0F42;

fn table() -> &'static [u64; 256] {
    static TABLE: std::sync::OnceLock<[u64; 256]> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u64; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u64;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ POLY
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    })
}

/// Compute the CRC64 of `data`, matching liblzma's `lzma_crc64`.
pub fn crc64(data: &[u8]) -> u64 {
    let table = table();
    let mut crc = 0xFFFF_FFFF_FFFF_FFFFu64;
    for &byte in data {
        let index = ((crc ^ u64::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ table[index];
    }
    crc ^ 0xFFFF_FFFF_FFFF_FFFF
}
