pub mod http;
mod path_processing;

use once_cell::sync::Lazy;
use regex::Regex;

pub use http::*;
pub use path_processing::expand_tilde;

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+]+)",
        r"(?i)((?:x-)?api-?key: )([^\s,]+)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s&]+)",
        r"(?i)(DATABASE_URL=)([^\s]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Value of the environment variable `name`, trimmed; `None` when unset or blank.
pub fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Redacts values that look like secrets in a string.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for re in SENSITIVE_PATTERNS.iter() {
        redacted = re
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_api_key_headers_and_query_values() {
        let line = "GET /v4/salestrend/snapshot?postalcode=30115&apikey=abc123 apikey: abc123";
        let redacted = redact_sensitive(line);
        assert!(!redacted.contains("abc123"), "{redacted}");
        assert!(redacted.contains("postalcode=30115"));
    }

    #[test]
    fn blank_env_values_count_as_unset() {
        temp_env::with_vars(
            [("LISTWISE_TEST_BLANK", Some("   ")), ("LISTWISE_TEST_SET", Some(" value "))],
            || {
                assert_eq!(non_empty_env("LISTWISE_TEST_BLANK"), None);
                assert_eq!(non_empty_env("LISTWISE_TEST_SET").as_deref(), Some("value"));
                assert_eq!(non_empty_env("LISTWISE_TEST_ABSENT"), None);
            },
        );
    }

    #[test]
    fn redacts_env_style_assignments() {
        let redacted = redact_sensitive("LISTWISE_PROPERTY_API_KEY=secret DATABASE_URL=sqlite://x.db");
        assert_eq!(redacted, "LISTWISE_PROPERTY_API_KEY=<redacted> DATABASE_URL=<redacted>");
    }
}
