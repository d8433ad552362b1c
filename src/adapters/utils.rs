//! Shared text validation helpers.

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
///
/// Used for the advertised device name and logged peer input.
pub(crate) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Printable rendering of a GATT write for log lines.  Non-printable bytes
/// become `.`, and output stops at `max` characters.
pub(crate) fn printable_preview(data: &[u8], max: usize) -> heapless::String<64> {
    let mut out = heapless::String::new();
    for &b in data.iter().take(max.min(64)) {
        let ch = if (0x20..=0x7E).contains(&b) { b as char } else { '.' };
        let _ = out.push(ch);
    }
    out
}
