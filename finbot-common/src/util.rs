//! Utility functions for FinBot services.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Uses character boundaries, so multi-byte UTF-8 input is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Sanitize a string for safe logging and client-facing errors (redact credentials).
///
/// Keys can travel as a `key=` query parameter, and reqwest includes the URL
/// in its error messages; upstream error bodies sometimes echo them too.
pub fn sanitize_for_log(s: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (r"([?&]key=)[^&\s)]+", "${1}***REDACTED***"),
        (r"(?i)(api[_-]?key|apikey)[=:]\s*\S{20,}", "$1=***REDACTED***"),
        (r"(?i)(token|secret|bearer)\s*[=:]\s*\S{10,}", "$1=***REDACTED***"),
        (r"AIza[0-9A-Za-z_\-]{30,}", "***REDACTED_API_KEY***"),
    ];

    let mut result = s.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(truncate_with_ellipsis("😀😀😀😀", 2), "😀😀...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
    }

    #[test]
    fn test_sanitize_query_key() {
        let input = "error sending request for url (https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key=secret-123)";
        let output = sanitize_for_log(input);
        assert!(!output.contains("secret-123"));
        assert!(output.contains("key=***REDACTED***"));
        assert!(output.ends_with(')'));
    }

    #[test]
    fn test_sanitize_google_key() {
        let input = "bad key AIzaSyA1234567890abcdefghijklmnopqrstu";
        let output = sanitize_for_log(input);
        assert!(!output.contains("AIzaSyA1234567890"));
        assert!(output.contains("REDACTED"));
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        assert_eq!(sanitize_for_log("quota exceeded"), "quota exceeded");
    }
}
