//! Per-request protocol signals.

use std::collections::BTreeSet;

use http::header::{ACCEPT, HOST, REFERER};
use http::{HeaderMap, Method, Request, Uri};

use crate::headers::{header_names, header_str, parse_key_list};

/// Representation the client negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Negotiated {
    /// A full HTML document.
    #[default]
    Document,
    /// A page object for client-side navigation.
    PageObject,
    /// Raw prop values, for API consumers.
    Data,
}

/// Signals extracted from one request.
///
/// Built once per request and threaded explicitly through the engine.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method.
    pub method: Method,
    /// Path and query of the request, stamped into the page object.
    pub url: String,
    /// Host the request was addressed to, for origin comparison.
    pub host: Option<String>,
    /// Scheme the client used (`http` or `https`), when known.
    pub scheme: Option<String>,
    /// Referring page, for back navigation.
    pub referer: Option<String>,
    /// Whether this is a page-protocol navigation.
    pub protocol: bool,
    /// Version token the client holds.
    pub version: Option<String>,
    /// Component a partial reload targets.
    pub partial_component: Option<String>,
    /// Keys to include.
    pub include: BTreeSet<String>,
    /// Keys to exclude.
    pub exclude: BTreeSet<String>,
    /// Merge keys the client resets.
    pub reset: BTreeSet<String>,
    /// Error bag to read.
    pub error_bag: Option<String>,
    /// Negotiated representation.
    pub negotiated: Negotiated,
}

impl RequestContext {
    /// Create a plain document request.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            host: None,
            scheme: None,
            referer: None,
            protocol: false,
            version: None,
            partial_component: None,
            include: BTreeSet::new(),
            exclude: BTreeSet::new(),
            reset: BTreeSet::new(),
            error_bag: None,
            negotiated: Negotiated::Document,
        }
    }

    /// Extract signals from request parts.
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::from_head(&parts.method, &parts.uri, &parts.headers)
    }

    /// Extract signals from a full request.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::from_head(request.method(), request.uri(), request.headers())
    }

    fn from_head(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut ctx = Self::new(method.clone(), url);
        ctx.host = header_str(headers.get(HOST)).or_else(|| uri.authority().map(|a| a.to_string()));
        ctx.scheme = uri
            .scheme_str()
            .map(str::to_string)
            .or_else(|| header_str(headers.get(header_names::X_FORWARDED_PROTO)))
            .map(|s| s.to_ascii_lowercase());
        ctx.apply_headers(headers);
        ctx
    }

    fn apply_headers(&mut self, headers: &HeaderMap) {
        self.protocol = headers.contains_key(header_names::X_INERTIA);
        self.version = header_str(headers.get(header_names::X_INERTIA_VERSION));
        self.partial_component = header_str(headers.get(header_names::X_INERTIA_PARTIAL_COMPONENT));
        self.include = parse_key_list(
            headers.get(header_names::X_INERTIA_PARTIAL_DATA),
            header_names::X_INERTIA_PARTIAL_DATA,
        );
        self.exclude = parse_key_list(
            headers.get(header_names::X_INERTIA_PARTIAL_EXCEPT),
            header_names::X_INERTIA_PARTIAL_EXCEPT,
        );
        self.reset = parse_key_list(
            headers.get(header_names::X_INERTIA_RESET),
            header_names::X_INERTIA_RESET,
        );
        self.error_bag = header_str(headers.get(header_names::X_INERTIA_ERROR_BAG));
        self.referer = header_str(headers.get(REFERER));

        self.negotiated = if self.protocol {
            Negotiated::PageObject
        } else if wants_data(headers) {
            Negotiated::Data
        } else {
            Negotiated::Document
        };
    }

    /// Mark as a protocol request holding `version`.
    pub fn protocol(mut self, version: impl Into<String>) -> Self {
        self.protocol = true;
        self.version = Some(version.into());
        self.negotiated = Negotiated::PageObject;
        self
    }

    /// Target a partial reload at `component`.
    pub fn partial(mut self, component: impl Into<String>) -> Self {
        self.partial_component = Some(component.into());
        self
    }

    /// Keys to include.
    pub fn only<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Keys to exclude.
    pub fn except<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Merge keys to reset.
    pub fn reset<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reset = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Error bag to read.
    pub fn error_bag(mut self, bag: impl Into<String>) -> Self {
        self.error_bag = Some(bag.into());
        self
    }

    /// Request host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Request scheme.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into().to_ascii_lowercase());
        self
    }

    /// Referring page.
    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Negotiate raw JSON data on a plain request.
    pub fn accept_json(mut self) -> Self {
        if !self.protocol {
            self.negotiated = Negotiated::Data;
        }
        self
    }

    /// Whether the method is a safe navigation.
    pub fn is_safe_navigation(&self) -> bool {
        self.method == Method::GET
    }
}

/// JSON is preferred when it is accepted and HTML is not.
fn wants_data(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let accept = accept.to_ascii_lowercase();
    let json = accept
        .split(',')
        .any(|t| t.split(';').next().map(str::trim) == Some("application/json"));
    json && !accept.contains("text/html")
}
