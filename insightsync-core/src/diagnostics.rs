//! Helpers for building bounded, secret-free diagnostic log payloads.

/// Upper bound on any single diagnostic payload written to the log.
pub const MAX_DIAGNOSTIC_CHARS: usize = 5000;

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Render an error body for the log: pretty JSON when it parses, raw text
/// otherwise, truncated to [`MAX_DIAGNOSTIC_CHARS`].
pub fn diagnostic_body(body: &str) -> String {
    let rendered = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => serde_json::to_string_pretty(&v).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    };
    truncate_chars(&rendered, MAX_DIAGNOSTIC_CHARS).to_string()
}

/// Replace the value of any `access_token` query parameter with `REDACTED`.
pub fn redact_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match query.split_once('#') {
        Some((q, f)) => (q, Some(f)),
        None => (query, None),
    };

    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("access_token", _)) => "access_token=REDACTED".to_string(),
            _ => pair.to_string(),
        })
        .collect();

    let mut out = format!("{base}?{}", redacted.join("&"));
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}
