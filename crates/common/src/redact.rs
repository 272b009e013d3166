//! Redaction of secret-bearing URLs for log output.
//!
//! Webhook endpoints embed their credential in the last path segment
//! (`/api/webhooks/{id}/{token}`), so logs keep the host and the leading
//! segments but never the token or the query string.

use url::Url;

const REDACTED: &str = "***";

/// Render `raw` with its final path segment and query elided.
///
/// URLs with a single path segment keep it; unparseable input is replaced
/// entirely.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "[invalid url]".into();
    };
    url.set_query(None);
    url.set_fragment(None);
    let _ = url.set_password(None);
    let _ = url.set_username("");

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default();

    if segments.len() >= 2 {
        let mut kept = segments[..segments.len() - 1].join("/");
        kept.push('/');
        kept.push_str(REDACTED);
        url.set_path(&kept);
    }
    url.to_string()
}
