//! File-extension to content-type mapping
//!
//! A closed static table evaluated first-match, not a full MIME database.
//! Unknown extensions fall back to a generic binary type.

/// Ordered (suffix, content-type) rules.
const CONTENT_TYPES: &[(&str, &str)] = &[
    (".html", "text/html"),
    (".htm", "text/html"),
    (".css", "text/css"),
    (".js", "application/javascript"),
    (".json", "application/json"),
    (".xml", "application/xml"),
    (".txt", "text/plain"),
    (".md", "text/plain"),
    (".csv", "text/csv"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".svg", "image/svg+xml"),
    (".ico", "image/x-icon"),
    (".pdf", "application/pdf"),
    (".zip", "application/zip"),
];

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for a remote key, matched on its suffix (case-insensitive).
pub fn content_type_for(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    for (suffix, content_type) in CONTENT_TYPES {
        if lower.ends_with(suffix) {
            return content_type;
        }
    }
    DEFAULT_CONTENT_TYPE
}
