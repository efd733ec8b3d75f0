//! Formatting helpers for reports.
//!
//! Byte counts are shown in binary units next to the exact value, flag
//! words and ODS tags in fixed-width hex.

/// Format a byte count as "exact (human)", e.g. `3072 (3.0 KiB)`.
pub fn format_size(bytes: u64) -> String {
    format!("{} ({})", bytes, human_size(bytes))
}

/// Binary-unit rendering of a byte count.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Format a u16 value as hex with 0x prefix.
pub fn format_hex16(value: u16) -> String {
    format!("0x{:04X}", value)
}
