//! HTTP cache control module
//!
//! Provides `ETag` generation, validator formatting and `Cache-Control` handling.

use chrono::{DateTime, Utc};
use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Generate `ETag` using fast hashing
///
/// # Arguments
/// * `content` - Payload bytes
///
/// # Returns
/// Quoted `ETag` string, e.g., `"abc123def"`
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    let v = hasher.finish();
    format!("\"{v:x}\"")
}

/// Normalize a validator into an `ETag` header value
///
/// Values that are already quoted (or weak, `W/"..."`) are kept as-is,
/// anything else is wrapped in double quotes.
pub fn quote_etag(validator: &str) -> String {
    if validator.starts_with('"') || validator.starts_with("W/") {
        validator.to_string()
    } else {
        format!("\"{validator}\"")
    }
}

/// Format a timestamp as an HTTP-date (RFC 7231 IMF-fixdate)
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use rangeserve::http::cache::http_date;
///
/// let t = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
/// assert_eq!(http_date(t), "Wed, 21 Oct 2015 07:28:00 GMT");
/// ```
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Mark the response as publicly cacheable
///
/// Existing directives are kept, except `private` which contradicts `public`.
pub fn mark_public(headers: &mut HeaderMap) {
    let existing = headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let mut directives: Vec<&str> = existing
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| !d.eq_ignore_ascii_case("private") && !d.eq_ignore_ascii_case("public"))
        .collect();
    directives.insert(0, "public");

    if let Ok(value) = HeaderValue::from_str(&directives.join(", ")) {
        headers.insert(CACHE_CONTROL, value);
    }
}
