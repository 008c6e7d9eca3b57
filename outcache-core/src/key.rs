//! Cache key derivation.
//!
//! Keys come in two forms: the **base key**, a pure function of the request
//! identity (method, scheme, host, path), and the **vary key**, the base key
//! extended with a canonical serialization of the vary-by dimensions. The
//! sections are joined with the ASCII control separators U+001E / U+001F,
//! which cannot occur in header values or URI components, so distinct inputs
//! can never collide by concatenation.

use std::fmt;
use std::sync::Arc;

use http::header::HOST;

use crate::context::CacheContext;
#[cfg(test)]
use crate::vary::VaryByRules;

/// Separator between key sections (U+001E, record separator).
pub const GROUP_SEPARATOR: char = '\u{1e}';
/// Separator between a dimension name and its values (U+001F, unit separator).
pub const UNIT_SEPARATOR: char = '\u{1f}';

/// A canonical cache key.
///
/// Wraps an `Arc<str>` so cloning a key is an O(1) reference-count bump;
/// keys are passed around on every stage of the request lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a zero-length key, which callers must treat as an error.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey(key.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes cache keys from a request context.
///
/// Implementations must be pure: the same context always yields the same
/// key, and no request data outside the configured vary-by rules may
/// contribute to the vary form.
pub trait KeyProvider: Send + Sync + 'static {
    /// The key for the request identity alone.
    fn base_key(&self, ctx: &CacheContext) -> CacheKey;

    /// The base key extended with the context's normalized vary-by rules.
    /// Falls back to the base key when no rule is active.
    fn vary_key(&self, ctx: &CacheContext) -> CacheKey;
}

/// The built-in key provider.
#[derive(Debug, Clone)]
pub struct DefaultKeyProvider {
    case_sensitive_paths: bool,
}

impl DefaultKeyProvider {
    /// Creates a provider. With `case_sensitive_paths` unset the request
    /// path is folded to uppercase before it contributes to the key.
    pub fn new(case_sensitive_paths: bool) -> Self {
        Self {
            case_sensitive_paths,
        }
    }
}

impl KeyProvider for DefaultKeyProvider {
    fn base_key(&self, ctx: &CacheContext) -> CacheKey {
        let uri = ctx.uri();
        let scheme = uri.scheme_str().unwrap_or("http");
        let host = uri.host().or_else(|| {
            ctx.request_headers()
                .get(HOST)
                .and_then(|value| value.to_str().ok())
        });

        let mut key = String::new();
        key.push_str(ctx.method().as_str());
        key.push(GROUP_SEPARATOR);
        key.push_str(scheme);
        key.push(GROUP_SEPARATOR);
        if let Some(host) = host {
            key.push_str(host);
        }
        if self.case_sensitive_paths {
            key.push_str(uri.path());
        } else {
            key.push_str(&uri.path().to_ascii_uppercase());
        }
        key.into()
    }

    fn vary_key(&self, ctx: &CacheContext) -> CacheKey {
        let base = self.base_key(ctx);
        let Some(rules) = ctx.vary_rules.as_ref().filter(|rules| !rules.is_empty()) else {
            return base;
        };

        let mut key = String::with_capacity(base.as_str().len() + 64);
        if !rules.prefix.is_empty() {
            key.push_str(&rules.prefix);
            key.push(GROUP_SEPARATOR);
        }
        key.push_str(base.as_str());

        key.push(GROUP_SEPARATOR);
        key.push('H');
        for name in &rules.headers {
            key.push(GROUP_SEPARATOR);
            key.push_str(&name.to_ascii_uppercase());
            let mut values: Vec<String> = ctx
                .request_headers()
                .get_all(name.as_str())
                .iter()
                .filter_map(|value| value.to_str().ok())
                .map(str::to_ascii_uppercase)
                .collect();
            values.sort_unstable();
            for value in values {
                key.push(UNIT_SEPARATOR);
                key.push_str(&value);
            }
        }

        key.push(GROUP_SEPARATOR);
        key.push('Q');
        let query = ctx.uri().query().unwrap_or("");
        for name in &rules.query_keys {
            key.push(GROUP_SEPARATOR);
            key.push_str(&name.to_ascii_uppercase());
            let mut values = query_values(query, name);
            values.sort_unstable();
            for value in values {
                key.push(UNIT_SEPARATOR);
                key.push_str(&value);
            }
        }

        key.push(GROUP_SEPARATOR);
        key.push('C');
        let mut custom: Vec<String> = rules
            .custom
            .iter()
            .map(|(name, value)| {
                let mut dimension = name.to_ascii_uppercase();
                dimension.push(UNIT_SEPARATOR);
                dimension.push_str(value);
                dimension
            })
            .collect();
        custom.sort_unstable();
        for dimension in custom {
            key.push(GROUP_SEPARATOR);
            key.push_str(&dimension);
        }

        key.into()
    }
}

/// Collects the uppercased values of one query key. The name comparison is
/// ASCII case-insensitive; values are kept percent-encoded as sent so that
/// equality on the wire means equality in the key.
fn query_values(query: &str, name: &str) -> Vec<String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT_LANGUAGE, VARY};
    use http::{HeaderMap, HeaderValue, Method, Uri};

    fn context(uri: &str, headers: HeaderMap) -> CacheContext {
        CacheContext::new(Method::GET, Uri::try_from(uri).unwrap(), headers)
    }

    fn rules(headers: &[&str], query_keys: &[&str]) -> VaryByRules {
        VaryByRules {
            prefix: String::new(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
            query_keys: query_keys.iter().map(|s| s.to_string()).collect(),
            custom: Vec::new(),
        }
        .normalize()
    }

    #[test]
    fn base_key_is_method_scheme_host_path() {
        let provider = DefaultKeyProvider::new(true);
        let ctx = context("https://example.com/users/42", HeaderMap::new());
        assert_eq!(
            provider.base_key(&ctx).as_str(),
            "GET\u{1e}https\u{1e}example.com/users/42"
        );
    }

    #[test]
    fn base_key_falls_back_to_host_header() {
        let provider = DefaultKeyProvider::new(true);
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("fallback.example"));
        let ctx = context("/relative/path", headers);
        assert_eq!(
            provider.base_key(&ctx).as_str(),
            "GET\u{1e}http\u{1e}fallback.example/relative/path"
        );
    }

    #[test]
    fn case_insensitive_paths_fold_to_uppercase() {
        let sensitive = DefaultKeyProvider::new(true);
        let insensitive = DefaultKeyProvider::new(false);
        let upper = context("http://example.com/Api/Users", HeaderMap::new());
        let lower = context("http://example.com/api/users", HeaderMap::new());

        assert_ne!(sensitive.base_key(&upper), sensitive.base_key(&lower));
        assert_eq!(insensitive.base_key(&upper), insensitive.base_key(&lower));
    }

    #[test]
    fn vary_key_without_rules_equals_base_key() {
        let provider = DefaultKeyProvider::new(true);
        let mut ctx = context("http://example.com/a", HeaderMap::new());
        assert_eq!(provider.vary_key(&ctx), provider.base_key(&ctx));
        ctx.vary_rules = Some(VaryByRules::default());
        assert_eq!(provider.vary_key(&ctx), provider.base_key(&ctx));
    }

    #[test]
    fn vary_key_segments_by_header_value() {
        let provider = DefaultKeyProvider::new(true);

        let mut en = HeaderMap::new();
        en.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        let mut ctx_en = context("http://example.com/b", en);
        ctx_en.vary_rules = Some(rules(&["accept-language"], &[]));

        let mut fr = HeaderMap::new();
        fr.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fr"));
        let mut ctx_fr = context("http://example.com/b", fr);
        ctx_fr.vary_rules = Some(rules(&["accept-language"], &[]));

        assert_ne!(provider.vary_key(&ctx_en), provider.vary_key(&ctx_fr));
        assert_ne!(provider.vary_key(&ctx_en), provider.base_key(&ctx_en));
    }

    #[test]
    fn multi_value_header_order_does_not_matter() {
        let provider = DefaultKeyProvider::new(true);

        let mut first = HeaderMap::new();
        first.append(VARY, HeaderValue::from_static("en"));
        first.append(VARY, HeaderValue::from_static("fr"));
        let mut ctx_a = context("http://example.com/b", first);
        ctx_a.vary_rules = Some(rules(&["vary"], &[]));

        let mut second = HeaderMap::new();
        second.append(VARY, HeaderValue::from_static("fr"));
        second.append(VARY, HeaderValue::from_static("EN"));
        let mut ctx_b = context("http://example.com/b", second);
        ctx_b.vary_rules = Some(rules(&["vary"], &[]));

        assert_eq!(provider.vary_key(&ctx_a), provider.vary_key(&ctx_b));
    }

    #[test]
    fn query_parameter_order_does_not_matter() {
        let provider = DefaultKeyProvider::new(true);

        let mut ctx_a = context("http://example.com/b?x=1&y=2&x=3", HeaderMap::new());
        ctx_a.vary_rules = Some(rules(&[], &["x", "y"]));

        let mut ctx_b = context("http://example.com/b?y=2&x=3&x=1", HeaderMap::new());
        ctx_b.vary_rules = Some(rules(&[], &["x", "y"]));

        assert_eq!(provider.vary_key(&ctx_a), provider.vary_key(&ctx_b));

        let mut ctx_c = context("http://example.com/b?y=2&x=3&x=2", HeaderMap::new());
        ctx_c.vary_rules = Some(rules(&[], &["x", "y"]));
        assert_ne!(provider.vary_key(&ctx_a), provider.vary_key(&ctx_c));
    }

    #[test]
    fn unselected_inputs_do_not_contribute() {
        let provider = DefaultKeyProvider::new(true);

        let mut noisy = HeaderMap::new();
        noisy.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        noisy.insert("x-request-id", HeaderValue::from_static("abc-123"));
        let mut ctx_a = context("http://example.com/b", noisy);
        ctx_a.vary_rules = Some(rules(&["accept-language"], &[]));

        let mut quiet = HeaderMap::new();
        quiet.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("EN"));
        let mut ctx_b = context("http://example.com/b", quiet);
        ctx_b.vary_rules = Some(rules(&["accept-language"], &[]));

        assert_eq!(provider.vary_key(&ctx_a), provider.vary_key(&ctx_b));
    }

    #[test]
    fn custom_dimensions_are_order_independent() {
        let provider = DefaultKeyProvider::new(true);
        let base = context("http://example.com/b", HeaderMap::new());

        let mut ctx_a = context("http://example.com/b", HeaderMap::new());
        ctx_a.vary_rules = Some(
            VaryByRules {
                custom: vec![("tenant".into(), "acme".into()), ("tier".into(), "gold".into())],
                ..Default::default()
            }
            .normalize(),
        );

        let mut ctx_b = context("http://example.com/b", HeaderMap::new());
        ctx_b.vary_rules = Some(
            VaryByRules {
                custom: vec![("tier".into(), "gold".into()), ("tenant".into(), "acme".into())],
                ..Default::default()
            }
            .normalize(),
        );

        assert_eq!(provider.vary_key(&ctx_a), provider.vary_key(&ctx_b));
        assert_ne!(provider.vary_key(&ctx_a), provider.base_key(&base));
    }

    #[test]
    fn prefix_namespaces_the_key() {
        let provider = DefaultKeyProvider::new(true);
        let mut ctx = context("http://example.com/b", HeaderMap::new());
        ctx.vary_rules = Some(VaryByRules {
            prefix: "v2".into(),
            ..Default::default()
        });
        let prefixed = provider.vary_key(&ctx);
        assert!(prefixed.as_str().starts_with("v2\u{1e}"));
    }
}
