//! `Cache-Control` directive parsing.

use std::time::Duration;

use http::HeaderMap;
use http::header::CACHE_CONTROL;

/// The `max-stale` request directive: bare (any amount of staleness is
/// acceptable) or bounded by a number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxStale {
    /// Directive present without a value.
    Any,
    /// Directive present with an explicit bound.
    Limit(Duration),
}

/// Parsed `Cache-Control` directives, request- and response-side combined.
///
/// Unknown directives and unparseable values are ignored, matching the
/// lenient handling proxies apply on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// `public`
    pub public: bool,
    /// `private`
    pub private: bool,
    /// `no-cache`
    pub no_cache: bool,
    /// `no-store`
    pub no_store: bool,
    /// `only-if-cached`
    pub only_if_cached: bool,
    /// `must-revalidate`
    pub must_revalidate: bool,
    /// `proxy-revalidate`
    pub proxy_revalidate: bool,
    /// `max-age=N`
    pub max_age: Option<Duration>,
    /// `s-maxage=N`
    pub s_maxage: Option<Duration>,
    /// `min-fresh=N`
    pub min_fresh: Option<Duration>,
    /// `max-stale` / `max-stale=N`
    pub max_stale: Option<MaxStale>,
}

impl CacheControl {
    /// Parses every `Cache-Control` header line in `headers`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut parsed = Self::default();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for directive in value.split(',') {
                parsed.apply(directive);
            }
        }
        parsed
    }

    fn apply(&mut self, directive: &str) {
        let (name, value) = {
            let mut split = directive.splitn(2, '=').map(str::trim);
            (split.next().unwrap_or(""), split.next())
        };

        match name.to_ascii_lowercase().as_str() {
            "public" => self.public = true,
            "private" => self.private = true,
            "no-cache" => self.no_cache = true,
            "no-store" => self.no_store = true,
            "only-if-cached" => self.only_if_cached = true,
            "must-revalidate" => self.must_revalidate = true,
            "proxy-revalidate" => self.proxy_revalidate = true,
            "max-age" => self.max_age = parse_seconds(value),
            "s-maxage" => self.s_maxage = parse_seconds(value),
            "min-fresh" => self.min_fresh = parse_seconds(value),
            "max-stale" => {
                self.max_stale = match value {
                    None => Some(MaxStale::Any),
                    Some(value) => parse_seconds(Some(value)).map(MaxStale::Limit),
                }
            }
            _ => {}
        }
    }
}

fn parse_seconds(value: Option<&str>) -> Option<Duration> {
    value
        .map(|value| value.trim_matches('"'))
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}
