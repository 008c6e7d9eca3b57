//! Policy hooks classifying requests and responses, plus the default
//! HTTP-semantics implementation.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::header::{PRAGMA, SET_COOKIE, VARY};
use http::{HeaderMap, Method, StatusCode};

use crate::clock::Clock;
use crate::context::CacheContext;
use crate::directives::{CacheControl, MaxStale};
use crate::entry::CachedResponse;
use crate::headers;

/// The three policy hooks invoked across the request lifecycle.
///
/// Hooks communicate by mutating the shared [`CacheContext`], which lets
/// several policies compose over the same request. Ordering is guaranteed by
/// the middleware: `on_request` strictly precedes any lookup or capture,
/// `on_serve_from_cache` strictly precedes serving a hit, and
/// `on_serve_response` strictly precedes header finalization.
#[async_trait]
pub trait PolicyProvider: Send + Sync + 'static {
    /// Classifies the request, setting `attempt_caching`, `allow_lookup`
    /// and `allow_storage` on the context. May also preset vary-by rules.
    async fn on_request(&self, ctx: &mut CacheContext);

    /// Invoked on a cache hit before serving. Returns whether the entry is
    /// fresh enough to serve; `ctx.entry_age` and `ctx.response_time` are
    /// populated before the call.
    async fn on_serve_from_cache(&self, ctx: &mut CacheContext, entry: &CachedResponse) -> bool;

    /// Invoked after the downstream completed, before headers are
    /// finalized. Decides `is_response_cacheable`.
    async fn on_serve_response(&self, ctx: &mut CacheContext, response: &http::response::Parts);
}

#[async_trait]
impl<T> PolicyProvider for Arc<T>
where
    T: PolicyProvider + ?Sized,
{
    async fn on_request(&self, ctx: &mut CacheContext) {
        self.as_ref().on_request(ctx).await
    }

    async fn on_serve_from_cache(&self, ctx: &mut CacheContext, entry: &CachedResponse) -> bool {
        self.as_ref().on_serve_from_cache(ctx, entry).await
    }

    async fn on_serve_response(&self, ctx: &mut CacheContext, response: &http::response::Parts) {
        self.as_ref().on_serve_response(ctx, response).await
    }
}

/// The default shared-cache policy.
///
/// Requests: only `GET`/`HEAD` participate; request `no-cache` (either
/// `Cache-Control` or `Pragma`) suppresses lookup, request `no-store`
/// suppresses storage. Responses: cached only when explicitly marked
/// `public` without any of the usual disqualifiers.
pub struct DefaultPolicy {
    clock: Arc<dyn Clock>,
}

impl DefaultPolicy {
    /// Creates the default policy reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl PolicyProvider for DefaultPolicy {
    async fn on_request(&self, ctx: &mut CacheContext) {
        let attempt = *ctx.method() == Method::GET || *ctx.method() == Method::HEAD;
        let request = CacheControl::from_headers(ctx.request_headers());
        let pragma_no_cache = ctx
            .request_headers()
            .get_all(PRAGMA)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.to_ascii_lowercase().contains("no-cache"));

        ctx.attempt_caching = attempt;
        ctx.allow_lookup = attempt && !request.no_cache && !pragma_no_cache;
        ctx.allow_storage = attempt && !request.no_store;
    }

    async fn on_serve_from_cache(&self, ctx: &mut CacheContext, entry: &CachedResponse) -> bool {
        let request = CacheControl::from_headers(ctx.request_headers());
        entry_is_fresh(
            entry,
            ctx.entry_age.unwrap_or(Duration::ZERO),
            &request,
            ctx.response_time.map(SystemTime::from),
        )
    }

    async fn on_serve_response(&self, ctx: &mut CacheContext, response: &http::response::Parts) {
        ctx.is_response_cacheable =
            response_is_cacheable(response.status, &response.headers, self.clock.now().into());
    }
}

/// Default response cacheability: `Cache-Control: public` without
/// `no-store`/`no-cache`/`private`, no `Set-Cookie`, `Vary` other than the
/// lone `*`, status `200 OK`, and a declared freshness lifetime that is not
/// already exhausted at capture time.
pub fn response_is_cacheable(status: StatusCode, headers: &HeaderMap, now: SystemTime) -> bool {
    let cc = CacheControl::from_headers(headers);
    if !cc.public || cc.no_store || cc.no_cache || cc.private {
        return false;
    }
    if headers.contains_key(SET_COOKIE) {
        return false;
    }
    if vary_is_wildcard(headers) {
        return false;
    }
    if status != StatusCode::OK {
        return false;
    }

    // A response that arrives already older than its declared lifetime
    // (clock-skewed origin, stale intermediary) is not worth storing.
    if let Some(date) = headers::date(headers) {
        let current_age = now.duration_since(date).unwrap_or(Duration::ZERO);
        let lifetime = cc.s_maxage.or(cc.max_age).or_else(|| {
            headers::expires(headers)
                .map(|expires| expires.duration_since(date).unwrap_or(Duration::ZERO))
        });
        if let Some(lifetime) = lifetime
            && current_age >= lifetime
        {
            return false;
        }
    }

    true
}

/// Default entry freshness for a request.
///
/// The effective age is the entry age plus any request `min-fresh` margin.
/// `s-maxage` wins outright for a shared cache; otherwise the stricter of
/// the cached and requested `max-age` applies, with `must-revalidate` /
/// `proxy-revalidate` vetoing the request's `max-stale` grace. With no
/// max-age information at all, the `Expires` header decides, and an entry
/// carrying no freshness information lives by its storage TTL alone.
pub fn entry_is_fresh(
    entry: &CachedResponse,
    entry_age: Duration,
    request: &CacheControl,
    response_time: Option<SystemTime>,
) -> bool {
    let cached = CacheControl::from_headers(&entry.headers);

    let mut age = entry_age;
    if let Some(min_fresh) = request.min_fresh {
        age += min_fresh;
    }

    if let Some(s_maxage) = cached.s_maxage {
        return age < s_maxage;
    }

    let lowest_max_age = match (cached.max_age, request.max_age) {
        (Some(cached), Some(requested)) => Some(cached.min(requested)),
        (cached, requested) => cached.or(requested),
    };
    if let Some(lowest) = lowest_max_age {
        if age < lowest {
            return true;
        }
        if cached.must_revalidate || cached.proxy_revalidate {
            return false;
        }
        return match request.max_stale {
            Some(MaxStale::Any) => true,
            Some(MaxStale::Limit(grace)) => age < lowest + grace,
            None => false,
        };
    }

    if let Some(expires) = headers::expires(&entry.headers)
        && let Some(response_time) = response_time
    {
        return response_time < expires;
    }

    true
}

fn vary_is_wildcard(headers: &HeaderMap) -> bool {
    let names: Vec<&str> = headers
        .get_all(VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    names == ["*"]
}
