//! Small helpers for binary data and report formatting.

// =============================================================================
// NUL-terminated strings
// =============================================================================

/// Finds the position of the first null byte in a slice.
///
/// Returns `data.len()` if there is none.
#[inline(always)]
pub fn memchr_null(data: &[u8]) -> usize {
    memchr::memchr(0, data).unwrap_or(data.len())
}

/// Returns the bytes before the first NUL, or `None` if `data` contains no
/// terminator.
#[inline]
pub fn c_str(data: &[u8]) -> Option<&[u8]> {
    memchr::memchr(0, data).map(|end| &data[..end])
}

/// Decodes a NUL-terminated string, falling back to the whole slice when no
/// terminator is present. Invalid UTF-8 is replaced.
pub fn c_str_lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(&data[..memchr_null(data)]).into_owned()
}

/// Decodes a fixed-width, NUL-padded name field such as `segname`.
#[inline]
pub fn fixed_name(raw: &[u8]) -> String {
    c_str_lossy(raw)
}

// =============================================================================
// Version formatting
// =============================================================================

/// Formats a version packed as `xxxx.yy.zz` (nibbles 16.8.8).
///
/// Trailing zero patch components are kept, matching `otool -L`.
pub fn format_version(packed: u32) -> String {
    format!(
        "{}.{}.{}",
        packed >> 16,
        (packed >> 8) & 0xFF,
        packed & 0xFF
    )
}

/// Formats a source version packed as `a.b.c.d.e` (24.10.10.10.10 bits).
pub fn format_source_version(packed: u64) -> String {
    let a = packed >> 40;
    let b = (packed >> 30) & 0x3FF;
    let c = (packed >> 20) & 0x3FF;
    let d = (packed >> 10) & 0x3FF;
    let e = packed & 0x3FF;
    format!("{}.{}.{}.{}.{}", a, b, c, d, e)
}

/// Formats a UUID in the canonical 8-4-4-4-12 upper-case form.
pub fn format_uuid(uuid: &[u8; 16]) -> String {
    let hex: Vec<String> = uuid.iter().map(|b| format!("{:02X}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        hex[..4].concat(),
        hex[4..6].concat(),
        hex[6..8].concat(),
        hex[8..10].concat(),
        hex[10..].concat()
    )
}

/// Formats a byte count with a binary unit suffix.
pub fn format_size(size: u64) -> String {
    if size >= 1024 * 1024 * 1024 {
        format!("{:.1}G", size as f64 / 1024.0 / 1024.0 / 1024.0)
    } else if size >= 1024 * 1024 {
        format!("{:.1}M", size as f64 / 1024.0 / 1024.0)
    } else if size >= 1024 {
        format!("{:.1}K", size as f64 / 1024.0)
    } else {
        format!("{}B", size)
    }
}

// =============================================================================
// Range checks
// =============================================================================

/// Returns `offset + size` if the range lies within `len`.
///
/// Overflowing ranges are rejected, not wrapped.
#[inline]
pub fn checked_range_end(offset: u64, size: u64, len: usize) -> Option<u64> {
    offset.checked_add(size).filter(|&end| end <= len as u64)
}
