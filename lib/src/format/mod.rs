pub mod pmd;

use encoding_rs::SHIFT_JIS;

/// Decodes a fixed-size name field from a PMD table.
///
/// Names are NUL-terminated Shift-JIS; fields that fill the whole slot carry
/// no terminator and fall back to UTF-8, then to a byte-preserving single-byte
/// read.
pub fn decode_fixed_name(raw: &[u8]) -> String {
    match raw.iter().position(|&b| b == 0) {
        Some(end) => {
            let (decoded, _, _) = SHIFT_JIS.decode(&raw[..end]);
            decoded.into_owned()
        }
        None => match std::str::from_utf8(raw) {
            Ok(name) => name.to_string(),
            Err(_) => raw.iter().map(|&b| b as char).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixed_name_ascii() {
        assert_eq!(decode_fixed_name(b"root\0\0\0\0\0\0\0"), "root");
    }

    #[test]
    fn test_decode_fixed_name_shift_jis() {
        // "ボーン" in Shift-JIS
        let raw = [0x83, 0x7B, 0x81, 0x5B, 0x83, 0x93, 0, 0, 0, 0, 0];
        assert_eq!(decode_fixed_name(&raw), "ボーン");
    }

    #[test]
    fn test_decode_fixed_name_unterminated() {
        assert_eq!(decode_fixed_name(b"bone_name_x"), "bone_name_x");
        // Invalid UTF-8 without a terminator is preserved byte-for-byte
        let raw = [b'a', 0xFF, b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j'];
        assert_eq!(decode_fixed_name(&raw), "a\u{ff}bcdefghij");
    }

    #[test]
    fn test_decode_fixed_name_empty() {
        assert_eq!(decode_fixed_name(&[0u8; 11]), "");
    }
}
