//! Repair of archive entry names stored in legacy code pages.
//!
//! Zip entries written without the UTF-8 flag carry whatever code page the packing tool used,
//! which for comics is usually GBK, Big5 or Shift_JIS.

use std::borrow::Cow;

use encoding_rs::{BIG5, EUC_KR, Encoding, GBK, SHIFT_JIS, UTF_8, WINDOWS_1252};

/// Legacy encodings tried after UTF-8, in order.
const LEGACY_ENCODINGS: [&Encoding; 4] = [GBK, BIG5, SHIFT_JIS, EUC_KR];

/// Decode a raw entry name. Valid UTF-8 is taken as is; otherwise the first legacy encoding that
/// decodes cleanly into a plausible name wins, and Windows-1252 catches everything else.
pub fn decode_entry_name(raw: &[u8]) -> Cow<'_, str> {
    if let Some(name) = UTF_8.decode_without_bom_handling_and_without_replacement(raw) {
        return name;
    }

    for encoding in LEGACY_ENCODINGS {
        if let Some(name) = encoding.decode_without_bom_handling_and_without_replacement(raw)
            && is_plausible(&name)
        {
            return name;
        }
    }

    let (name, _, _) = WINDOWS_1252.decode(raw);
    name
}

fn is_plausible(name: &str) -> bool {
    !name.trim().is_empty() && !name.chars().any(char::is_control)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_names_pass_through() {
        assert_eq!(decode_entry_name("pages/封面.jpg".as_bytes()), "pages/封面.jpg");
        assert!(matches!(decode_entry_name(b"001.png"), Cow::Borrowed(_)));
    }

    #[test]
    fn gbk_names_are_repaired() {
        let (raw, _, _) = GBK.encode("第一话/封面.jpg");
        assert!(std::str::from_utf8(&raw).is_err());
        assert_eq!(decode_entry_name(&raw), "第一话/封面.jpg");
    }

    #[test]
    fn undecodable_bytes_still_yield_a_name() {
        let name = decode_entry_name(&[0x81, 0x00, b'.', b'j', b'p', b'g']);
        assert!(name.ends_with(".jpg"));
    }
}
