//! The Tower service implementing the per-request caching state machine.
//!
//! Lifecycle, in order: classify (policy `on_request`), lookup, serve /
//! revalidate, capture, pass-through. All per-request state lives in a
//! [`CacheContext`] owned by the request's future; the storage backend is
//! the only shared mutable state.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use http::header::{AGE, CACHE_CONTROL, CONTENT_LOCATION, DATE, ETAG, EXPIRES, VARY};
use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use http_body::Body;
use outcache_core::{
    CacheContext, CacheEntry, CacheError, CacheKey, CachedResponse, Clock, ConfigurationError,
    KeyProvider, PolicyProvider, Storage, conditional, directives::CacheControl, headers,
};
use tower::Service;
use tracing::{debug, error, warn};

use crate::body::{CaptureBody, CommitIntent, OutputCacheBody};
use crate::config::CacheOptions;
use crate::status::{BypassReason, CacheStatus, OutputCacheMarker};

/// Headers a `304 Not Modified` reply is allowed to carry, per RFC 9111.
const NOT_MODIFIED_HEADERS: [HeaderName; 6] =
    [CACHE_CONTROL, CONTENT_LOCATION, DATE, ETAG, EXPIRES, VARY];

/// Collaborators shared by every request of one middleware instance.
pub(crate) struct SharedState<B> {
    pub(crate) storage: Arc<B>,
    pub(crate) policy: Arc<dyn PolicyProvider>,
    pub(crate) key_provider: Arc<dyn KeyProvider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) options: Arc<CacheOptions>,
}

impl<B> Clone for SharedState<B> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            policy: Arc::clone(&self.policy),
            key_provider: Arc::clone(&self.key_provider),
            clock: Arc::clone(&self.clock),
            options: Arc::clone(&self.options),
        }
    }
}

/// Tower [`Service`] that serves eligible requests from the cache and
/// transparently captures downstream responses for future reuse.
///
/// Created by applying an [`OutputCache`](crate::layer::OutputCache) layer
/// to an upstream service.
pub struct OutputCacheService<S, B> {
    upstream: S,
    shared: SharedState<B>,
}

impl<S, B> OutputCacheService<S, B> {
    pub(crate) fn new(upstream: S, shared: SharedState<B>) -> Self {
        Self { upstream, shared }
    }
}

impl<S, B> Clone for OutputCacheService<S, B>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            upstream: self.upstream.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<S, B, ReqBody, ResBody> Service<Request<ReqBody>> for OutputCacheService<S, B>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    B: Storage,
    ReqBody: Send + 'static,
    ResBody: Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Send,
{
    type Response = Response<OutputCacheBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.upstream.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone.
        let clone = self.upstream.clone();
        let upstream = std::mem::replace(&mut self.upstream, clone);
        let shared = self.shared.clone();
        Box::pin(handle(shared, upstream, request))
    }
}

async fn handle<S, B, ReqBody, ResBody>(
    shared: SharedState<B>,
    mut upstream: S,
    mut request: Request<ReqBody>,
) -> Result<Response<OutputCacheBody<ResBody>>, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    B: Storage,
    ResBody: Body,
{
    if request.extensions().get::<OutputCacheMarker>().is_some() {
        error!("{}", CacheError::Configuration(ConfigurationError::DuplicateMiddleware));
        return Ok(internal_error());
    }

    let mut ctx = CacheContext::new(
        request.method().clone(),
        request.uri().clone(),
        request.headers().clone(),
    );
    shared.policy.on_request(&mut ctx).await;

    if !ctx.attempt_caching {
        request.extensions_mut().insert(OutputCacheMarker);
        let response = upstream.call(request).await?;
        return Ok(CacheStatus::Bypass(BypassReason::Declined)
            .with_response(response.map(OutputCacheBody::Passthrough)));
    }

    let request_directives = CacheControl::from_headers(ctx.request_headers());

    let base_key = if ctx.allow_lookup || ctx.allow_storage {
        let key = shared.key_provider.base_key(&ctx);
        if key.is_empty() {
            error!("{}", CacheError::KeyUndefined);
            return Ok(internal_error());
        }
        ctx.cache_key = Some(key.clone());
        Some(key)
    } else {
        None
    };

    if ctx.allow_lookup
        && let Some(base_key) = base_key.as_ref()
    {
        if let Some(entry) = lookup(&shared, &mut ctx, base_key).await {
            if let Some(response) = try_serve(&shared, &mut ctx, &entry).await {
                return Ok(response);
            }
        } else if request_directives.only_if_cached {
            debug!(key = %base_key, "only-if-cached request missed");
            let mut response = Response::new(OutputCacheBody::empty());
            *response.status_mut() = StatusCode::GATEWAY_TIMEOUT;
            response.extensions_mut().insert(CacheStatus::Unserviceable);
            return Ok(response);
        }
    }

    request.extensions_mut().insert(OutputCacheMarker);

    if !ctx.allow_storage {
        let response = upstream.call(request).await?;
        return Ok(CacheStatus::Bypass(BypassReason::StorageNotAllowed)
            .with_response(response.map(OutputCacheBody::Passthrough)));
    }

    let method = ctx.method().clone();
    let response = upstream.call(request).await?;
    let (mut parts, body) = response.into_parts();

    shared.policy.on_serve_response(&mut ctx, &parts).await;
    start_response(&shared, &mut ctx, &mut parts);

    let commit =
        base_key.and_then(|base_key| build_commit(&shared, &mut ctx, &parts, base_key, method));
    let capture = CaptureBody::new(
        body,
        commit,
        shared.options.segment_size,
        shared.options.maximum_body_size,
    );

    let mut response = Response::from_parts(parts, OutputCacheBody::Capture(capture));
    response.extensions_mut().insert(CacheStatus::Miss);
    Ok(response)
}

/// Resolves a request to a stored response, chasing the vary-rule record
/// when one is present. Backend failures read as misses.
async fn lookup<B: Storage>(
    shared: &SharedState<B>,
    ctx: &mut CacheContext,
    base_key: &CacheKey,
) -> Option<Arc<CachedResponse>> {
    let found = match shared.storage.get(base_key).await {
        Ok(found) => found,
        Err(error) => {
            warn!(error = %error, key = %base_key, "cache lookup failed, treating as miss");
            return None;
        }
    };

    match found {
        Some(CacheEntry::Response(entry)) => Some(entry),
        Some(CacheEntry::Vary(rules)) => {
            ctx.vary_rules = Some(rules.normalize());
            let vary_key = shared.key_provider.vary_key(ctx);
            ctx.cache_key = Some(vary_key.clone());
            match shared.storage.get(&vary_key).await {
                Ok(Some(CacheEntry::Response(entry))) => Some(entry),
                Ok(_) => None,
                Err(error) => {
                    warn!(error = %error, key = %vary_key, "cache lookup failed, treating as miss");
                    None
                }
            }
        }
        None => None,
    }
}

/// Attempts to serve a hit: evaluates freshness through the policy, then
/// either answers the request's conditional preconditions with a 304 or
/// replays the stored response. Returns `None` when the entry cannot be
/// served, letting the request fall through to capture.
async fn try_serve<B, ResBody>(
    shared: &SharedState<B>,
    ctx: &mut CacheContext,
    entry: &Arc<CachedResponse>,
) -> Option<Response<OutputCacheBody<ResBody>>>
where
    B: Storage,
    ResBody: Body,
{
    let now = shared.clock.now();
    ctx.response_time = Some(now);
    let age = (now - entry.created).to_std().unwrap_or(Duration::ZERO);
    ctx.entry_age = Some(age);

    if !shared.policy.on_serve_from_cache(ctx, entry).await {
        debug!(age = ?age, "cached entry not fresh, falling through");
        return None;
    }

    if conditional::not_modified(ctx.request_headers(), entry) {
        let mut response = Response::new(OutputCacheBody::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        for name in &NOT_MODIFIED_HEADERS {
            for value in entry.headers.get_all(name) {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }
        response.extensions_mut().insert(CacheStatus::Revalidated);
        return Some(response);
    }

    let mut response = Response::new(OutputCacheBody::replay(entry.body.clone()));
    *response.status_mut() = entry.status;
    *response.headers_mut() = entry.headers.clone();
    response
        .headers_mut()
        .insert(AGE, HeaderValue::from(age.as_secs()));
    response.extensions_mut().insert(CacheStatus::Hit);
    Some(response)
}

/// The idempotent response-started transition: records the response time
/// and, for cacheable responses, resolves the storage TTL, stamps `Date`,
/// and snapshots status and headers (minus `Age`) for the commit.
fn start_response<B>(
    shared: &SharedState<B>,
    ctx: &mut CacheContext,
    parts: &mut http::response::Parts,
) {
    if !ctx.mark_response_started() {
        return;
    }
    let now = shared.clock.now();
    ctx.response_time = Some(now);

    if !ctx.is_response_cacheable {
        return;
    }

    let response_directives = CacheControl::from_headers(&parts.headers);
    let valid_for = response_directives
        .s_maxage
        .or(response_directives.max_age)
        .or_else(|| headers::expires_after(&parts.headers, now))
        .unwrap_or(shared.options.default_expiration);
    ctx.valid_for = Some(valid_for);

    if !parts.headers.contains_key(DATE)
        && let Some(value) = headers::format_http_date(now)
    {
        parts.headers.insert(DATE, value);
    }
    let created = headers::date(&parts.headers)
        .map(DateTime::<Utc>::from)
        .unwrap_or(now);

    let mut snapshot_headers = parts.headers.clone();
    snapshot_headers.remove(AGE);
    ctx.cached_response = Some(CachedResponse {
        created,
        status: parts.status,
        headers: snapshot_headers,
        body: Bytes::new(),
    });
}

/// Assembles the deferred-commit state carried by the capture body.
/// Returns `None` when the response did not qualify for storage.
fn build_commit<B: Storage>(
    shared: &SharedState<B>,
    ctx: &mut CacheContext,
    parts: &http::response::Parts,
    base_key: CacheKey,
    method: Method,
) -> Option<CommitIntent> {
    let snapshot = ctx.cached_response.take()?;

    let mut rules = ctx.vary_rules.take().unwrap_or_default();
    rules.merge_vary_header(&parts.headers);
    let rules = rules.normalize();

    let (response_key, vary_rules) = if rules.is_empty() {
        (base_key.clone(), None)
    } else {
        ctx.vary_rules = Some(rules.clone());
        let vary_key = shared.key_provider.vary_key(ctx);
        ctx.cache_key = Some(vary_key.clone());
        (vary_key, Some(rules))
    };

    let storage: Arc<dyn Storage> = shared.storage.clone();
    Some(CommitIntent {
        storage,
        base_key,
        response_key,
        vary_rules,
        snapshot,
        ttl: ctx.valid_for.unwrap_or(shared.options.default_expiration),
        method,
        content_length: headers::content_length(&parts.headers),
        has_transfer_encoding: headers::has_transfer_encoding(&parts.headers),
    })
}

fn internal_error<ResBody>() -> Response<OutputCacheBody<ResBody>> {
    let mut response = Response::new(OutputCacheBody::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
