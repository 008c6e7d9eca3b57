//! Small helpers for reading and writing HTTP date and framing headers.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use http::header::{CONTENT_LENGTH, DATE, EXPIRES, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue};

/// Parses an HTTP-date header value (IMF-fixdate and the obsolete forms).
pub fn parse_http_date(value: &HeaderValue) -> Option<SystemTime> {
    let value = value.to_str().ok()?;
    httpdate::parse_http_date(value).ok()
}

/// Formats an instant as an IMF-fixdate header value.
pub fn format_http_date(instant: DateTime<Utc>) -> Option<HeaderValue> {
    let formatted = httpdate::fmt_http_date(SystemTime::from(instant));
    HeaderValue::try_from(formatted).ok()
}

/// Reads the `Date` header as a timestamp.
pub fn date(headers: &HeaderMap) -> Option<SystemTime> {
    headers.get(DATE).and_then(parse_http_date)
}

/// Reads the `Expires` header as a timestamp.
pub fn expires(headers: &HeaderMap) -> Option<SystemTime> {
    headers.get(EXPIRES).and_then(parse_http_date)
}

/// How long the `Expires` header outlives `now`. Zero once it has passed.
pub fn expires_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let expires = expires(headers)?;
    Some(
        expires
            .duration_since(SystemTime::from(now))
            .unwrap_or(Duration::ZERO),
    )
}

/// Reads a well-formed `Content-Length` header.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// True when the response declares a `Transfer-Encoding`.
pub fn has_transfer_encoding(headers: &HeaderMap) -> bool {
    headers.contains_key(TRANSFER_ENCODING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn http_date_round_trips() {
        let instant = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).single().unwrap();
        let value = format_http_date(instant).unwrap();
        assert_eq!(value.to_str().unwrap(), "Tue, 01 Jul 2025 10:00:00 GMT");
        assert_eq!(parse_http_date(&value), Some(SystemTime::from(instant)));
    }

    #[test]
    fn expires_after_saturates_at_zero() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).single().unwrap();
        let mut headers = HeaderMap::new();

        headers.insert(EXPIRES, format_http_date(now + chrono::Duration::seconds(90)).unwrap());
        assert_eq!(expires_after(&headers, now), Some(Duration::from_secs(90)));

        headers.insert(EXPIRES, format_http_date(now - chrono::Duration::seconds(90)).unwrap());
        assert_eq!(expires_after(&headers, now), Some(Duration::ZERO));
    }

    #[test]
    fn content_length_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(content_length(&headers), Some(42));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("forty-two"));
        assert_eq!(content_length(&headers), None);
    }
}
