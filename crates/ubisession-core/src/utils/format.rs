/// Pull the human-readable message out of an HTML error page.
///
/// The services gateway answers some failures with a bare page such as
/// `<html><body><h1>502 Bad Gateway</h1></body></html>`. The heading text is
/// the only useful part; anything without a heading is returned trimmed.
pub fn extract_html_message(text: &str) -> String {
    match text.split("h1>").nth(1) {
        Some(heading) => heading
            .strip_suffix("</")
            .unwrap_or(heading)
            .trim()
            .to_string(),
        None => text.trim().to_string(),
    }
}

/// Render a JSON scalar for a message: strings without quotes, anything else as JSON.
pub fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
