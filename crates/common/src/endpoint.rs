//! Endpoint derivation for OpenAI-compatible APIs.
//!
//! Providers accept a base URL that may be a bare host, a host with a
//! version segment (`/v1`, `/api/paas/v4`), or a fully spelled-out endpoint.
//! `api_endpoint` normalizes all three forms.

fn normalize_base_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Build the URL for `resource` (e.g. `"embeddings"`, `"chat/completions"`)
/// from a user-supplied base URL.
pub fn api_endpoint(base_url: &str, resource: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if normalized.ends_with(&format!("/{resource}")) {
        return normalized.to_string();
    }
    if has_version_suffix(normalized) {
        return format!("{normalized}/{resource}");
    }
    format!("{normalized}/v1/{resource}")
}
