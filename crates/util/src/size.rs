//! Parsing of human-readable size strings from properties.

/// Parse a size value such as `65536`, `64k`, `8m` or `1g` into bytes.
///
/// Suffixes are case-insensitive and use binary multiples.
#[must_use]
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (digits, multiplier) = match value.chars().last() {
        Some('k' | 'K') => (&value[..value.len() - 1], 1024u64),
        Some('m' | 'M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g' | 'G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::parse_size;

    #[test]
    fn parses_plain_bytes() {
        assert_eq!(parse_size("65536"), Some(65536));
    }

    #[test]
    fn parses_suffixes() {
        assert_eq!(parse_size("64k"), Some(64 * 1024));
        assert_eq!(parse_size("8M"), Some(8 * 1024 * 1024));
        assert_eq!(parse_size("1g"), Some(1024 * 1024 * 1024));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("12q"), None);
        assert_eq!(parse_size("k"), None);
    }
}
