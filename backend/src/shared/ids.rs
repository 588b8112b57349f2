pub const MAX_CLIENT_ID_LENGTH: usize = 64;

/// Keeps `[A-Za-z0-9_-]` up to the length limit. May return an empty string.
pub fn sanitize_client_id(value: &str) -> String {
    let mut cleaned = String::with_capacity(value.len().min(MAX_CLIENT_ID_LENGTH));
    for ch in value.chars() {
        if cleaned.len() >= MAX_CLIENT_ID_LENGTH {
            break;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            cleaned.push(ch);
        }
    }
    cleaned
}

/// Client identity from a header value, minting a fresh one when nothing usable is supplied.
pub fn resolve_client_id(header: Option<&str>) -> String {
    let cleaned = header.map(sanitize_client_id).unwrap_or_default();
    if cleaned.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        cleaned
    }
}
