//! Built-in middleware components.
//!
//! - [`SecurityMiddleware`] - HTTPS redirect and security-related headers
//! - [`AllowedHostsMiddleware`] - Rejects requests for hosts the service doesn't serve
//! - [`CorsMiddleware`] - Adds CORS headers for cross-origin requests
//! - [`XFrameOptionsMiddleware`] - Sets `X-Frame-Options`
//! - [`UnhandledExceptionsMiddleware`] - Logs unhandled exceptions and answers 500

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::Value;

use restbase_core::settings::{CorsSettings, SecuritySettings};
use restbase_core::Settings;

use super::{Middleware, RequestHead, SERVER_ERROR_DETAIL};
use crate::exception::Exception;
use crate::response::ErrorResponse;

fn is_secure(uri: &Uri, headers: &HeaderMap, proxy_ssl_header: Option<&(String, String)>) -> bool {
    if uri.scheme_str() == Some("https") {
        return true;
    }
    proxy_ssl_header.is_some_and(|(name, expected)| {
        headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case(expected))
    })
}

fn request_host(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
        .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
}

// ── SecurityMiddleware ──────────────────────────────────────────────────

/// Middleware that redirects plain HTTP to HTTPS and sets security headers.
///
/// Sets the following headers:
/// - `Strict-Transport-Security` (secure requests only, if `hsts_seconds > 0`)
/// - `X-Content-Type-Options: nosniff`
/// - `X-XSS-Protection: 1; mode=block`
/// - `Referrer-Policy`
#[derive(Debug, Clone)]
pub struct SecurityMiddleware {
    /// Number of seconds for the HSTS max-age directive. Set to 0 to disable.
    pub hsts_seconds: u64,
    /// Whether to include subdomains in the HSTS header.
    pub hsts_include_subdomains: bool,
    /// Whether to include the preload directive in the HSTS header.
    pub hsts_preload: bool,
    /// Whether to send `X-Content-Type-Options: nosniff`.
    pub content_type_nosniff: bool,
    /// Whether to send `X-XSS-Protection: 1; mode=block`.
    pub browser_xss_filter: bool,
    /// The `Referrer-Policy` value, if any.
    pub referrer_policy: Option<String>,
    /// Whether to redirect plain-HTTP requests to HTTPS.
    pub ssl_redirect: bool,
    /// Header and value that mark a proxied request as secure.
    pub proxy_ssl_header: Option<(String, String)>,
}

impl Default for SecurityMiddleware {
    fn default() -> Self {
        Self {
            hsts_seconds: 0,
            hsts_include_subdomains: false,
            hsts_preload: false,
            content_type_nosniff: true,
            browser_xss_filter: true,
            referrer_policy: None,
            ssl_redirect: false,
            proxy_ssl_header: None,
        }
    }
}

impl SecurityMiddleware {
    /// Builds the middleware from the security settings.
    pub fn from_settings(settings: &SecuritySettings) -> Self {
        Self {
            hsts_seconds: settings.hsts_seconds,
            hsts_include_subdomains: settings.hsts_include_subdomains,
            hsts_preload: settings.hsts_preload,
            content_type_nosniff: settings.content_type_nosniff,
            browser_xss_filter: settings.browser_xss_filter,
            referrer_policy: settings.referrer_policy.clone(),
            ssl_redirect: settings.ssl_redirect,
            proxy_ssl_header: settings.proxy_ssl_header.clone(),
        }
    }

    fn hsts_value(&self) -> String {
        let mut value = format!("max-age={}", self.hsts_seconds);
        if self.hsts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.hsts_preload {
            value.push_str("; preload");
        }
        value
    }
}

#[async_trait]
impl Middleware for SecurityMiddleware {
    async fn process_request(&self, request: &mut Request) -> Option<Response> {
        if !self.ssl_redirect
            || is_secure(request.uri(), request.headers(), self.proxy_ssl_header.as_ref())
        {
            return None;
        }

        let host = request_host(request.uri(), request.headers())?;
        let path_and_query = request
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let location = HeaderValue::from_str(&format!("https://{host}{path_and_query}")).ok()?;

        tracing::debug!(%host, path = request.uri().path(), "redirecting to https");
        Some((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response())
    }

    async fn process_response(&self, head: &RequestHead, response: Response) -> Response {
        let mut resp = response;
        let headers = resp.headers_mut();

        if self.hsts_seconds > 0
            && is_secure(&head.uri, &head.headers, self.proxy_ssl_header.as_ref())
            && !headers.contains_key(header::STRICT_TRANSPORT_SECURITY)
        {
            if let Ok(value) = HeaderValue::from_str(&self.hsts_value()) {
                headers.insert(header::STRICT_TRANSPORT_SECURITY, value);
            }
        }

        if self.content_type_nosniff {
            headers.insert(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
        }

        if self.browser_xss_filter {
            headers.insert(
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("1; mode=block"),
            );
        }

        if let Some(policy) = &self.referrer_policy {
            if let Ok(value) = HeaderValue::from_str(policy) {
                headers.entry(header::REFERRER_POLICY).or_insert(value);
            }
        }

        resp
    }
}

// ── AllowedHostsMiddleware ──────────────────────────────────────────────

/// Middleware that rejects requests whose `Host` the service doesn't serve.
///
/// Patterns: `*` matches everything, `.example.com` matches `example.com`
/// and any subdomain, anything else must match exactly (case-insensitive).
/// In debug mode an empty list allows the local loopback names.
#[derive(Debug, Clone, Default)]
pub struct AllowedHostsMiddleware {
    /// Accepted host patterns.
    pub allowed_hosts: Vec<String>,
}

const DEBUG_HOSTS: [&str; 4] = ["localhost", ".localhost", "127.0.0.1", "[::1]"];

impl AllowedHostsMiddleware {
    /// Creates the middleware for the given patterns.
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        Self { allowed_hosts }
    }

    /// Builds the middleware from `allowed_hosts` and `debug`.
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.debug && settings.allowed_hosts.is_empty() {
            return Self::new(DEBUG_HOSTS.iter().map(ToString::to_string).collect());
        }
        Self::new(settings.allowed_hosts.clone())
    }

    /// Returns `true` if `host` (which may carry a port) is allowed.
    pub fn is_allowed(&self, host: &str) -> bool {
        let domain = strip_port(host).trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return false;
        }
        self.allowed_hosts
            .iter()
            .any(|pattern| host_matches(&domain, &pattern.to_ascii_lowercase()))
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.rsplit_once(':').map_or(host, |(domain, _)| domain)
}

fn host_matches(domain: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('.') {
        return domain == suffix || domain.ends_with(pattern);
    }
    domain == pattern
}

#[async_trait]
impl Middleware for AllowedHostsMiddleware {
    async fn process_request(&self, request: &mut Request) -> Option<Response> {
        let host = request_host(request.uri(), request.headers()).unwrap_or_default();
        if self.is_allowed(&host) {
            return None;
        }

        tracing::warn!(%host, "rejected request for disallowed host");
        Some(
            ErrorResponse::detail(
                StatusCode::BAD_REQUEST,
                format!("Invalid HTTP_HOST header: '{host}'."),
            )
            .into_response(),
        )
    }
}

// ── CorsMiddleware ──────────────────────────────────────────────────────

/// Middleware that adds CORS (Cross-Origin Resource Sharing) headers to responses.
///
/// Handles preflight OPTIONS requests and adds the allow-origin header to
/// responses for accepted origins.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    /// Accept every origin.
    pub allow_all_origins: bool,
    /// Accepted origins when `allow_all_origins` is off.
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods for CORS requests.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
    /// Whether to allow credentials (cookies, authorization headers).
    pub allow_credentials: bool,
    /// Max age for preflight cache (in seconds).
    pub max_age: u64,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allow_all_origins: false,
            allowed_origins: Vec::new(),
            allowed_methods: ["DELETE", "GET", "OPTIONS", "PATCH", "POST", "PUT"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            allowed_headers: [
                "accept",
                "authorization",
                "content-type",
                "origin",
                "user-agent",
                "x-csrftoken",
                "x-requested-with",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            allow_credentials: false,
            max_age: 86400,
        }
    }
}

impl CorsMiddleware {
    /// Builds the middleware from the CORS settings.
    pub fn from_settings(settings: &CorsSettings) -> Self {
        Self {
            allow_all_origins: settings.allow_all_origins,
            allowed_origins: settings.allowed_origins.clone(),
            allow_credentials: settings.allow_credentials,
            ..Self::default()
        }
    }

    fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allow_all_origins || self.allowed_origins.iter().any(|o| o == origin || o == "*")
    }

    fn add_cors_headers(&self, headers: &mut HeaderMap, origin: &str) {
        let value = if self.allow_all_origins && !self.allow_credentials {
            Some(HeaderValue::from_static("*"))
        } else {
            HeaderValue::from_str(origin).ok()
        };
        if let Some(value) = value {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }

        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    fn insert_joined(headers: &mut HeaderMap, name: HeaderName, values: &[String]) {
        if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
            headers.insert(name, value);
        }
    }
}

fn origin_of(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|o| !o.is_empty())
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn process_request(&self, request: &mut Request) -> Option<Response> {
        if request.method() != Method::OPTIONS
            || !request
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
        {
            return None;
        }

        let origin = origin_of(request.headers())?;
        if !self.is_origin_allowed(origin) {
            return None;
        }

        let mut response = StatusCode::OK.into_response();
        let headers = response.headers_mut();
        self.add_cors_headers(headers, origin);
        Self::insert_joined(headers, header::ACCESS_CONTROL_ALLOW_METHODS, &self.allowed_methods);
        Self::insert_joined(headers, header::ACCESS_CONTROL_ALLOW_HEADERS, &self.allowed_headers);
        if let Ok(value) = HeaderValue::from_str(&self.max_age.to_string()) {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, value);
        }
        Some(response)
    }

    async fn process_response(&self, head: &RequestHead, response: Response) -> Response {
        let Some(origin) = origin_of(&head.headers) else {
            return response;
        };
        if !self.is_origin_allowed(origin) {
            return response;
        }

        let mut resp = response;
        self.add_cors_headers(resp.headers_mut(), origin);
        resp
    }
}

// ── XFrameOptionsMiddleware ─────────────────────────────────────────────

/// Middleware that sets `X-Frame-Options` unless the response already has one.
#[derive(Debug, Clone)]
pub struct XFrameOptionsMiddleware {
    /// The header value (`DENY` or `SAMEORIGIN`).
    pub value: String,
}

impl Default for XFrameOptionsMiddleware {
    fn default() -> Self {
        Self::new("DENY")
    }
}

impl XFrameOptionsMiddleware {
    /// Creates the middleware with the given header value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[async_trait]
impl Middleware for XFrameOptionsMiddleware {
    async fn process_response(&self, _head: &RequestHead, response: Response) -> Response {
        let mut resp = response;
        if let Ok(value) = HeaderValue::from_str(&self.value.to_ascii_uppercase()) {
            resp.headers_mut()
                .entry(header::X_FRAME_OPTIONS)
                .or_insert(value);
        }
        resp
    }
}

// ── UnhandledExceptionsMiddleware ───────────────────────────────────────

/// Middleware that logs an unhandled exception and answers a JSON 500.
///
/// In debug mode the body also carries the exception's message under
/// `exception`.
#[derive(Debug, Clone, Default)]
pub struct UnhandledExceptionsMiddleware {
    /// Include the exception message in the body.
    pub debug: bool,
}

impl UnhandledExceptionsMiddleware {
    /// Creates the middleware.
    pub const fn new(debug: bool) -> Self {
        Self { debug }
    }
}

#[async_trait]
impl Middleware for UnhandledExceptionsMiddleware {
    async fn process_exception(&self, head: &RequestHead, exception: &Exception) -> Option<Response> {
        tracing::error!(
            error = %exception,
            category = exception.category(),
            method = %head.method,
            path = head.path(),
            request_id = %head.request_id,
            "unhandled exception"
        );

        let mut resp = ErrorResponse::detail(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_DETAIL);
        if self.debug {
            resp.insert("exception", Value::String(exception.to_string()));
        }
        Some(resp.into_response())
    }
}
