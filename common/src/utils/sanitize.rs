//! Helpers for cleaning text before it is persisted into structured columns.

/// Upper bound on stored error messages, in characters.
pub const MAX_ERROR_CHARS: usize = 500;

/// Strips control characters, collapses runs of whitespace and caps the
/// result at `max_chars` characters.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Error text as it may be stored on an item result. Credentials echoed
/// back by upstream services are masked.
///
/// Whitespace is normalised before masking so a credential separated from
/// its scheme by a newline or tab is still recognised.
pub fn sanitize_error(input: &str) -> String {
    let normalised = sanitize_text(input, usize::MAX);
    let masked = redact_secrets(&normalised);
    sanitize_text(&masked, MAX_ERROR_CHARS)
}

const REDACTED: &str = "[redacted]";
const SECRET_KEYS: [&str; 4] = ["token=", "key=", "secret=", "password="];

fn redact_secrets(input: &str) -> String {
    let mut out = Vec::new();
    let mut after_bearer = false;
    for word in input.split(' ') {
        let lower = word.to_ascii_lowercase();
        if after_bearer && !word.is_empty() {
            out.push(REDACTED.to_string());
            after_bearer = false;
            continue;
        }
        if lower.trim_end_matches(':') == "bearer" {
            after_bearer = true;
            out.push(word.to_string());
        } else if lower.starts_with("sk-") {
            out.push(REDACTED.to_string());
        } else if let Some(end) = SECRET_KEYS
            .iter()
            .find_map(|k| lower.find(k).map(|p| p.saturating_add(k.len())))
        {
            let prefix = word.get(..end).unwrap_or(word);
            out.push(format!("{prefix}{REDACTED}"));
        } else {
            out.push(word.to_string());
        }
    }
    out.join(" ")
}
