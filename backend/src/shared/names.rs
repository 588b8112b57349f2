pub const MAX_PLAYER_NAME_LENGTH: usize = 20;

pub fn sanitize_player_name(name: &str, fallback: &str) -> String {
    let cleaned = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return fallback.to_string();
    }
    cleaned.chars().take(MAX_PLAYER_NAME_LENGTH).collect()
}

/// Accepts `#rrggbb` only, normalized to lowercase.
pub fn sanitize_color(value: &str) -> Option<String> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", hex.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_collapse_whitespace_and_truncate() {
        assert_eq!(sanitize_player_name("  ada \t lovelace ", "Player"), "ada lovelace");
        assert_eq!(sanitize_player_name("   ", "Player"), "Player");
        assert_eq!(
            sanitize_player_name("abcdefghijklmnopqrstuvwxyz", "Player").len(),
            MAX_PLAYER_NAME_LENGTH
        );
    }

    #[test]
    fn colors_must_be_six_hex_digits() {
        assert_eq!(sanitize_color("#A1b2C3").as_deref(), Some("#a1b2c3"));
        assert_eq!(sanitize_color("a1b2c3"), None);
        assert_eq!(sanitize_color("#abc"), None);
        assert_eq!(sanitize_color("#ggggggg"), None);
        assert_eq!(sanitize_color("#12345z"), None);
    }
}
