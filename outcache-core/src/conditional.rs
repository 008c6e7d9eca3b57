//! Conditional-request evaluation against a cached response.

use std::time::SystemTime;

use http::HeaderMap;
use http::header::{DATE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};

use crate::entry::CachedResponse;
use crate::headers::parse_http_date;

/// Whether the cached response is "not modified" relative to the request's
/// preconditions, i.e. a `304 Not Modified` may be emitted instead of the
/// stored body.
///
/// `If-None-Match` takes precedence over `If-Modified-Since`; a request with
/// neither never matches.
pub fn not_modified(request: &HeaderMap, entry: &CachedResponse) -> bool {
    if request.contains_key(IF_NONE_MATCH) {
        return if_none_match(request, entry);
    }
    if let Some(since) = request.get(IF_MODIFIED_SINCE).and_then(parse_http_date) {
        return last_modified(entry).is_some_and(|modified| modified <= since);
    }
    false
}

fn if_none_match(request: &HeaderMap, entry: &CachedResponse) -> bool {
    let tags: Vec<&str> = request
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect();

    if tags == ["*"] {
        return true;
    }

    let Some(cached) = entry.headers.get(ETAG).and_then(|value| value.to_str().ok()) else {
        return false;
    };
    tags.iter().any(|tag| weak_etag_eq(tag, cached))
}

/// Weak comparison: the `W/` prefix is ignored on both sides.
fn weak_etag_eq(a: &str, b: &str) -> bool {
    fn strip(tag: &str) -> &str {
        tag.strip_prefix("W/").unwrap_or(tag)
    }
    strip(a) == strip(b)
}

/// Resolves the entry's last-modified instant: `Last-Modified` when present
/// and parseable, the `Date` header otherwise.
fn last_modified(entry: &CachedResponse) -> Option<SystemTime> {
    entry
        .headers
        .get(LAST_MODIFIED)
        .and_then(parse_http_date)
        .or_else(|| entry.headers.get(DATE).and_then(parse_http_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::format_http_date;
    use bytes::Bytes;
    use chrono::{Duration, Utc};
    use http::{HeaderValue, StatusCode};

    fn entry(headers: HeaderMap) -> CachedResponse {
        CachedResponse {
            created: Utc::now(),
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"body"),
        }
    }

    fn request(name: http::header::HeaderName, value: HeaderValue) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, value);
        headers
    }

    #[test]
    fn no_preconditions_never_match() {
        let entry = entry(HeaderMap::new());
        assert!(!not_modified(&HeaderMap::new(), &entry));
    }

    #[test]
    fn if_none_match_star_always_matches() {
        let entry = entry(HeaderMap::new());
        let request = request(IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(not_modified(&request, &entry));
    }

    #[test]
    fn if_none_match_compares_weakly() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"v1\""));
        let entry = entry(headers);

        for sent in ["\"v1\"", "W/\"v1\"", "\"v0\", W/\"v1\""] {
            let request = request(IF_NONE_MATCH, HeaderValue::from_str(sent).unwrap());
            assert!(not_modified(&request, &entry), "expected match for {sent}");
        }

        let request = request(IF_NONE_MATCH, HeaderValue::from_static("\"v2\""));
        assert!(!not_modified(&request, &entry));
    }

    #[test]
    fn if_none_match_without_cached_etag_does_not_match() {
        let entry = entry(HeaderMap::new());
        let request = request(IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        assert!(!not_modified(&request, &entry));
    }

    #[test]
    fn if_modified_since_uses_last_modified() {
        let modified = Utc::now() - Duration::hours(2);
        let mut headers = HeaderMap::new();
        headers.insert(LAST_MODIFIED, format_http_date(modified).unwrap());
        let entry = entry(headers);

        let after = format_http_date(modified + Duration::hours(1)).unwrap();
        assert!(not_modified(&request(IF_MODIFIED_SINCE, after), &entry));

        let before = format_http_date(modified - Duration::hours(1)).unwrap();
        assert!(!not_modified(&request(IF_MODIFIED_SINCE, before), &entry));
    }

    #[test]
    fn if_modified_since_falls_back_to_date_header() {
        let stamped = Utc::now() - Duration::hours(2);
        let mut headers = HeaderMap::new();
        headers.insert(DATE, format_http_date(stamped).unwrap());
        let entry = entry(headers);

        let after = format_http_date(stamped + Duration::hours(1)).unwrap();
        assert!(not_modified(&request(IF_MODIFIED_SINCE, after), &entry));
    }

    #[test]
    fn if_none_match_takes_precedence_over_if_modified_since() {
        let stamped = Utc::now() - Duration::hours(2);
        let mut headers = HeaderMap::new();
        headers.insert(DATE, format_http_date(stamped).unwrap());
        headers.insert(ETAG, HeaderValue::from_static("\"v1\""));
        let entry = entry(headers);

        // Etag mismatch loses even though the date precondition would match.
        let mut request = HeaderMap::new();
        request.insert(IF_NONE_MATCH, HeaderValue::from_static("\"v2\""));
        request.insert(
            IF_MODIFIED_SINCE,
            format_http_date(stamped + Duration::hours(1)).unwrap(),
        );
        assert!(!not_modified(&request, &entry));
    }
}
