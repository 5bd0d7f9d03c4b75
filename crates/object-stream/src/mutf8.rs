//! Modified UTF-8 as written by `DataOutput.writeUTF`.
//!
//! Differs from UTF-8 in two ways: NUL is encoded as `C0 80`, and
//! supplementary characters are written as two 3-byte surrogate halves.

/// Decodes modified UTF-8. The flag is `true` when replacement characters
/// had to be substituted for malformed input.
pub(crate) fn decode(bytes: &[u8]) -> (String, bool) {
    if let Ok(s) = std::str::from_utf8(bytes) {
        // Plain UTF-8 never contains C0 80 or encoded surrogates.
        return (s.to_owned(), false);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut malformed = false;
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 < 0x80 {
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xe0 == 0xc0 && continuation(bytes, i + 1) {
            units.push((((b0 & 0x1f) as u16) << 6) | (bytes[i + 1] & 0x3f) as u16);
            i += 2;
        } else if b0 & 0xf0 == 0xe0 && continuation(bytes, i + 1) && continuation(bytes, i + 2) {
            units.push(
                (((b0 & 0x0f) as u16) << 12)
                    | (((bytes[i + 1] & 0x3f) as u16) << 6)
                    | (bytes[i + 2] & 0x3f) as u16,
            );
            i += 3;
        } else if b0 & 0xf8 == 0xf0
            && continuation(bytes, i + 1)
            && continuation(bytes, i + 2)
            && continuation(bytes, i + 3)
        {
            // Standard 4-byte form; not produced by writeUTF but accepted.
            let cp = (((b0 & 0x07) as u32) << 18)
                | (((bytes[i + 1] & 0x3f) as u32) << 12)
                | (((bytes[i + 2] & 0x3f) as u32) << 6)
                | (bytes[i + 3] & 0x3f) as u32;
            match char::from_u32(cp) {
                Some(c) => {
                    let mut buf = [0u16; 2];
                    units.extend_from_slice(c.encode_utf16(&mut buf));
                }
                None => {
                    units.push(0xfffd);
                    malformed = true;
                }
            }
            i += 4;
        } else {
            units.push(0xfffd);
            malformed = true;
            i += 1;
        }
    }

    let mut out = String::with_capacity(units.len());
    for c in char::decode_utf16(units) {
        match c {
            Ok(c) => out.push(c),
            Err(_) => {
                out.push(char::REPLACEMENT_CHARACTER);
                malformed = true;
            }
        }
    }
    (out, malformed)
}

fn continuation(bytes: &[u8], i: usize) -> bool {
    bytes.get(i).is_some_and(|b| b & 0xc0 == 0x80)
}
