//! Debug utility for printing octets as hex strings.

use std::fmt::Write as _;

/// Formats a byte slice as a hex string for debugging.
///
/// At most `max` bytes are printed; the remainder is summarized.
///
/// # Example
///
/// ```
/// use qpdata_buffers::print_octets;
///
/// assert_eq!(print_octets(&[0xac, 0xed, 0x00, 0x05], 16), "ac ed 00 05");
/// assert_eq!(print_octets(&[1, 2, 3], 2), "01 02... (1 more)");
/// assert_eq!(print_octets(&[], 16), "");
/// ```
pub fn print_octets(octets: &[u8], max: usize) -> String {
    let mut result = String::with_capacity(octets.len().min(max) * 3);
    for (i, byte) in octets.iter().take(max).enumerate() {
        if i > 0 {
            result.push(' ');
        }
        let _ = write!(result, "{byte:02x}");
    }
    if octets.len() > max {
        let _ = write!(result, "... ({} more)", octets.len() - max);
    }
    result
}
