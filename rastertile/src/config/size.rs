//! Byte sizes written for humans ("64MB", "1 GB", "512k").

use thiserror::Error;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Recognised suffixes, longest first so "MB" wins over "B".
const UNITS: &[(&str, usize)] = &[
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{0}': expected a whole number with an optional B, KB, MB or GB suffix")]
pub struct SizeParseError(String);

/// Parse a size into bytes.
///
/// Suffixes are binary and case-insensitive; a bare number is bytes.
///
/// ```
/// use rastertile::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("64 mb").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
/// ```
pub fn parse_size(input: &str) -> Result<usize, SizeParseError> {
    let err = || SizeParseError(input.to_string());
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|&(suffix, mult)| upper.strip_suffix(suffix).map(|rest| (rest, mult)))
        .unwrap_or((upper.as_str(), 1));
    let digits = digits.trim_end();

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    let value: usize = digits.parse().map_err(|_| err())?;
    value.checked_mul(multiplier).ok_or_else(err)
}

/// Format a byte count using the largest unit that divides it exactly.
///
/// ```
/// use rastertile::config::format_size;
///
/// assert_eq!(format_size(2 * 1024 * 1024), "2MB");
/// assert_eq!(format_size(1536), "1536B");
/// ```
pub fn format_size(bytes: usize) -> String {
    for &(suffix, mult) in &UNITS[..3] {
        if bytes >= mult && bytes % mult == 0 {
            return format!("{}{}", bytes / mult, suffix);
        }
    }
    format!("{}B", bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("12345").unwrap(), 12345);
        assert_eq!(parse_size("512B").unwrap(), 512);
    }

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(parse_size("8K").unwrap(), 8 * KB);
        assert_eq!(parse_size("8kb").unwrap(), 8 * KB);
        assert_eq!(parse_size("3M").unwrap(), 3 * MB);
        assert_eq!(parse_size("3Mb").unwrap(), 3 * MB);
        assert_eq!(parse_size("2g").unwrap(), 2 * GB);
        assert_eq!(parse_size("2GB").unwrap(), 2 * GB);
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(parse_size("  64MB ").unwrap(), 64 * MB);
        assert_eq!(parse_size("64 MB").unwrap(), 64 * MB);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "MB", "abc", "-1MB", "1.5GB", "10TB", "1 2MB", "+5"] {
            assert!(parse_size(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_size(&format!("{}GB", usize::MAX)).is_err());
    }

    #[test]
    fn test_error_message_keeps_input() {
        let err = parse_size("lots").unwrap_err();
        assert!(err.to_string().starts_with("Invalid size 'lots'"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(1000), "1000B");
        assert_eq!(format_size(KB), "1KB");
        assert_eq!(format_size(3 * MB), "3MB");
        assert_eq!(format_size(GB), "1GB");
        assert_eq!(format_size(GB + MB), "1025MB");
        assert_eq!(parse_size(&format_size(48 * MB)).unwrap(), 48 * MB);
    }
}
