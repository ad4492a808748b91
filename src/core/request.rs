//! Request descriptors, cache keys and URL building.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Method
// =============================================================================

/// HTTP method of a logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Parse a method name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

// =============================================================================
// Cache Policy
// =============================================================================

/// Per-request caching choice. Only honored for GET.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    Disabled,
    /// Cache using the cache manager's default TTL.
    DefaultTtl,
    /// Cache for the given duration.
    Ttl(Duration),
}

impl CachePolicy {
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Explicit TTL, if any. `None` means the cache default applies.
    #[must_use]
    pub const fn ttl(self) -> Option<Duration> {
        match self {
            Self::Ttl(ttl) => Some(ttl),
            Self::Disabled | Self::DefaultTtl => None,
        }
    }
}

// =============================================================================
// Request Descriptor
// =============================================================================

/// A logical request as it flows through the pipeline.
///
/// Interceptors receive the descriptor by value and hand back a (possibly
/// modified) copy. Options left as `None` fall back to the pipeline
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Relative path or absolute `http(s)://` URL.
    pub url: String,
    /// Query parameters. Must be a JSON object when present.
    pub params: Option<Value>,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub cache: CachePolicy,
    /// Retry budget override.
    pub retry: Option<u32>,
    pub show_loading: Option<bool>,
    pub loading_text: Option<String>,
    pub show_error: Option<bool>,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: None,
            body: None,
            headers: BTreeMap::new(),
            timeout: None,
            cache: CachePolicy::Disabled,
            retry: None,
            show_loading: None,
            loading_text: None,
            show_error: None,
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Shorthand for `with_cache(CachePolicy::Ttl(ttl))`.
    #[must_use]
    pub const fn cached_for(self, ttl: Duration) -> Self {
        self.with_cache(CachePolicy::Ttl(ttl))
    }

    #[must_use]
    pub const fn with_retry(mut self, budget: u32) -> Self {
        self.retry = Some(budget);
        self
    }

    #[must_use]
    pub const fn with_loading(mut self, show: bool) -> Self {
        self.show_loading = Some(show);
        self
    }

    #[must_use]
    pub fn with_loading_text(mut self, text: impl Into<String>) -> Self {
        self.loading_text = Some(text.into());
        self
    }

    #[must_use]
    pub const fn with_error_toast(mut self, show: bool) -> Self {
        self.show_error = Some(show);
        self
    }

    /// Whether the pipeline consults and populates the cache for this request.
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        matches!(self.method, Method::Get) && self.cache.is_enabled()
    }

    /// Stable cache key: `METHOD:url:params-json`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        cache_key(self.method, &self.url, self.params.as_ref())
    }
}

// =============================================================================
// Cache Keys
// =============================================================================

/// Build the cache key for a request.
///
/// Params are serialized as JSON with object keys sorted at every depth, so
/// `{"b":1,"a":2}` and `{"a":2,"b":1}` share a key. Missing params serialize
/// as `{}`.
#[must_use]
pub fn cache_key(method: Method, url: &str, params: Option<&Value>) -> String {
    let params = params.map_or_else(|| "{}".to_string(), canonical_json);
    format!("{method}:{url}:{params}")
}

/// Prefix shared by every cache key of `method` + `url`.
#[must_use]
pub fn cache_key_prefix(method: Method, url: &str) -> String {
    format!("{method}:{url}:")
}

/// Serialize with object keys in sorted order.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key.clone(), sort_keys(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

// =============================================================================
// URL Building
// =============================================================================

/// Whether `url` is already absolute.
#[must_use]
pub fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Join a relative path onto `base_url`; absolute URLs pass through.
#[must_use]
pub fn join_url(base_url: &str, path: &str) -> String {
    if is_absolute(path) {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Append `params` to `url` as a query string.
///
/// Keys are emitted in sorted order. Null values are skipped. Strings are
/// used verbatim and other values use their JSON text. An existing query
/// string is extended with `&`.
#[must_use]
pub fn append_query(url: &str, params: Option<&Value>) -> String {
    let Some(Value::Object(map)) = params else {
        return url.to_string();
    };

    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in entries {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        serializer.append_pair(key, &text);
        any = true;
    }
    if !any {
        return url.to_string();
    }

    let query = serializer.finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// Full URL for a descriptor: base URL joined with the path, plus the query.
#[must_use]
pub fn build_url(base_url: &str, descriptor: &RequestDescriptor) -> String {
    append_query(&join_url(base_url, &descriptor.url), descriptor.params.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_matches_documented_format() {
        let descriptor = RequestDescriptor::get("/items").with_params(json!({"page": 1}));
        assert_eq!(descriptor.cache_key(), "GET:/items:{\"page\":1}");
    }

    #[test]
    fn cache_key_without_params_uses_empty_object() {
        assert_eq!(cache_key(Method::Get, "/items", None), "GET:/items:{}");
    }

    #[test]
    fn cache_key_is_independent_of_param_order() {
        let a = cache_key(Method::Get, "/p", Some(&json!({"b": 1, "a": {"z": 1, "y": 2}})));
        let b = cache_key(Method::Get, "/p", Some(&json!({"a": {"y": 2, "z": 1}, "b": 1})));
        assert_eq!(a, b);
        assert_eq!(a, "GET:/p:{\"a\":{\"y\":2,\"z\":1},\"b\":1}");
    }

    #[test]
    fn only_get_is_cacheable() {
        for method in [Method::Post, Method::Put, Method::Delete] {
            let descriptor = RequestDescriptor::new(method, "/x").with_cache(CachePolicy::DefaultTtl);
            assert!(!descriptor.is_cacheable(), "{method} must bypass the cache");
        }
        assert!(RequestDescriptor::get("/x").with_cache(CachePolicy::DefaultTtl).is_cacheable());
        assert!(!RequestDescriptor::get("/x").is_cacheable());
    }

    #[test]
    fn join_url_handles_slashes_and_absolute_urls() {
        assert_eq!(join_url("https://api.example.com/v1/", "/items"), "https://api.example.com/v1/items");
        assert_eq!(join_url("https://api.example.com/v1", "items"), "https://api.example.com/v1/items");
        assert_eq!(join_url("https://api.example.com", "https://cdn.example.com/a"), "https://cdn.example.com/a");
    }

    #[test]
    fn append_query_sorts_and_skips_null() {
        let params = json!({"size": 20, "page": 1, "q": "red shoes", "tag": null});
        assert_eq!(
            append_query("/items", Some(&params)),
            "/items?page=1&q=red+shoes&size=20"
        );
    }

    #[test]
    fn append_query_extends_existing_query() {
        assert_eq!(append_query("/items?x=1", Some(&json!({"y": true}))), "/items?x=1&y=true");
        assert_eq!(append_query("/items", Some(&json!({"only": null}))), "/items");
        assert_eq!(append_query("/items", None), "/items");
    }

    #[test]
    fn method_names_round_trip() {
        for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
            assert_eq!(Method::from_name(method.as_str()), Some(method));
        }
        assert_eq!(Method::from_name("patch"), None);
        assert_eq!(Method::from_name("get"), Some(Method::Get));
    }
}
