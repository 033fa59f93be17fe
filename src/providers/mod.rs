//! Provider subsystem for completion backends.
//!
//! Each provider implements the [`Provider`] trait defined in [`traits`]. The
//! factory [`create_provider`] builds the backend described by
//! `[generation]`. Free-form answers, function calling and agent sessions all
//! share it.

pub mod compatible;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ToolCall, ToolSpec};

use crate::config::GenerationConfig;
use std::sync::Arc;
use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub secret-looking tokens from upstream error strings.
///
/// Redacts OpenAI-style `sk-` keys and values echoed after `Bearer`,
/// `api-key` or `Ocp-Apim-Subscription-Key` markers.
pub fn scrub_secret_patterns(input: &str) -> String {
    const MARKERS: [(&str, bool); 5] = [
        ("sk-", true),
        ("Bearer ", false),
        ("api-key: ", false),
        ("api-key=", false),
        ("Ocp-Apim-Subscription-Key: ", false),
    ];

    let mut scrubbed = input.to_string();

    for (marker, redact_marker) in MARKERS {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(marker) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + marker.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            let from = if redact_marker { start } else { content_start };
            scrubbed.replace_range(from..end, "[REDACTED]");
            search_from = from + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Factory: create the completion provider from `[generation]`.
pub fn create_provider(config: &GenerationConfig) -> Arc<dyn Provider> {
    let key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());
    if key.is_none() {
        tracing::warn!("generation API key not set; completions will fail");
    }
    Arc::new(OpenAiCompatibleProvider::new(
        "generation",
        &config.api_url,
        key,
        &config.model,
        config.temperature,
        Duration::from_secs(config.timeout_secs),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_named_provider() {
        let provider = create_provider(&GenerationConfig::default());
        assert_eq!(provider.name(), "generation");
    }

    // ── API error sanitization ───────────────────────────────

    #[test]
    fn sanitize_scrubs_sk_prefix() {
        let input = "request failed: sk-1234567890abcdef";
        let out = sanitize_api_error(input);
        assert!(!out.contains("sk-1234567890abcdef"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn sanitize_scrubs_multiple_prefixes() {
        let input = "keys sk-abcdef api-key=12345 api-key: 67890";
        let out = sanitize_api_error(input);
        assert!(!out.contains("sk-abcdef"));
        assert!(!out.contains("12345"));
        assert!(!out.contains("67890"));
    }

    #[test]
    fn sanitize_truncates_long_error() {
        let long = "a".repeat(400);
        let result = sanitize_api_error(&long);
        assert!(result.len() <= 203);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn sanitize_no_secret_no_change() {
        let input = "simple upstream timeout";
        let result = sanitize_api_error(input);
        assert_eq!(result, input);
    }

    #[test]
    fn scrub_keeps_marker_and_hides_value() {
        let input = "echoed header Ocp-Apim-Subscription-Key: 0123abcd and Bearer tok.en-1";
        let result = scrub_secret_patterns(input);
        assert_eq!(
            result,
            "echoed header Ocp-Apim-Subscription-Key: [REDACTED] and Bearer [REDACTED]"
        );
    }

    #[test]
    fn scrub_ignores_bare_markers() {
        assert_eq!(scrub_secret_patterns("use sk- keys"), "use sk- keys");
    }
}
