//! Response state machine.

use std::sync::Arc;

use http::header::{CONTENT_TYPE, LOCATION, VARY};
use http::uri::Authority;
use http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use turbo_assets::{AssetRefs, AssetVersioner};
use turbo_session::SessionStore;

use crate::headers::{header_names, VARY_SIGNALS};
use crate::{
    DocumentRenderer, Negotiated, Outcome, PageConfig, PageDefinition, PageError,
    PageObjectBuilder, PartialReloadFilter, PropResolver, PropSharer, RequestContext,
    ShellRenderer,
};

/// Response produced by the engine.
pub type PageResponse = http::Response<String>;

const JSON: &str = "application/json";
const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

/// Final shape chosen for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// Client assets are outdated; it must reload.
    StaleClient,
    /// Page object JSON for client-side navigation.
    PageObject,
    /// Raw prop values without the page object envelope.
    RawPassthrough,
    /// Rendered document embedding the page object.
    Document,
    /// Navigation to another location.
    Redirect,
    /// The handler failed.
    Failure,
}

impl ResponseState {
    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaleClient => "stale_client",
            Self::PageObject => "page_object",
            Self::RawPassthrough => "raw_passthrough",
            Self::Document => "document",
            Self::Redirect => "redirect",
            Self::Failure => "failure",
        }
    }
}

/// Decides and produces the response for one request.
pub struct ResponseNegotiator {
    config: PageConfig,
    versioner: AssetVersioner,
    builder: PageObjectBuilder,
    renderer: Option<Arc<dyn DocumentRenderer>>,
}

impl ResponseNegotiator {
    /// Create a negotiator rendering documents with [`ShellRenderer`].
    pub fn new(config: PageConfig, versioner: AssetVersioner) -> Self {
        let builder = PageObjectBuilder::new(
            PartialReloadFilter::new(config.always_precedence),
            PropResolver::new(config.concurrency(), config.provider_timeout()),
        )
        .with_encrypt_history(config.encrypt_history);

        Self {
            config,
            versioner,
            builder,
            renderer: Some(Arc::new(ShellRenderer::default())),
        }
    }

    /// Validate `config` and build the versioner it describes.
    pub fn from_config(config: PageConfig) -> Result<Self, PageError> {
        config.validate()?;
        let versioner = config.build_versioner()?;
        Ok(Self::new(config, versioner))
    }

    /// Replace the document renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Serve raw props instead of documents to plain requests.
    pub fn without_renderer(mut self) -> Self {
        self.renderer = None;
        self
    }

    /// Share props with every page.
    pub fn share(mut self, sharer: impl PropSharer + 'static) -> Self {
        self.builder.add_sharer(Arc::new(sharer));
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    /// Current asset version.
    pub fn version(&self) -> String {
        self.versioner.version()
    }

    /// Reject a stale client before running the handler.
    ///
    /// Returns the conflict response, or `None` if the request may proceed.
    pub fn check_version(&self, ctx: &RequestContext) -> Option<PageResponse> {
        let version = self.versioner.version();
        is_stale(ctx, &version).then(|| stale_response(ctx, &version))
    }

    /// The state `outcome` leads to for `ctx`.
    pub fn classify(&self, ctx: &RequestContext, outcome: &Outcome) -> ResponseState {
        self.classify_with(ctx, outcome, &self.versioner.version())
    }

    fn classify_with(&self, ctx: &RequestContext, outcome: &Outcome, version: &str) -> ResponseState {
        if is_stale(ctx, version) {
            return ResponseState::StaleClient;
        }
        match outcome {
            Outcome::Redirect { .. } | Outcome::Back => ResponseState::Redirect,
            Outcome::Failure(_) => ResponseState::Failure,
            Outcome::Render(page) => self.render_state(ctx, page),
        }
    }

    fn render_state(&self, ctx: &RequestContext, page: &PageDefinition) -> ResponseState {
        if ctx.protocol {
            return ResponseState::PageObject;
        }
        if self.renderer.is_some() && page.document {
            return ResponseState::Document;
        }
        if ctx.negotiated != Negotiated::Data && self.renderer.is_none() {
            tracing::warn!(
                component = %page.component,
                "no document renderer configured, serving raw props"
            );
        }
        ResponseState::RawPassthrough
    }

    /// Produce the response for a handler outcome.
    ///
    /// Everything the response needs, providers included, runs inside the
    /// returned future; dropping it cancels the work.
    pub async fn respond(&self, ctx: &RequestContext, session: &dyn SessionStore, outcome: Outcome) -> PageResponse {
        let version = self.versioner.version();
        let state = self.classify_with(ctx, &outcome, &version);

        let response = match (state, outcome) {
            (ResponseState::StaleClient, _) => stale_response(ctx, &version),
            (_, Outcome::Redirect { target, external }) => redirect_response(ctx, &target, external),
            (_, Outcome::Back) => {
                let target = ctx.referer.clone().unwrap_or_else(|| "/".to_string());
                redirect_response(ctx, &target, false)
            }
            (_, Outcome::Failure(reason)) => {
                tracing::error!(url = %ctx.url, reason = %reason, "handler failed");
                server_error()
            }
            (state, Outcome::Render(page)) => {
                let component = page.component.clone();
                match self.render(ctx, session, page, state, &version).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(component = %component, error = %e, "page response failed");
                        server_error()
                    }
                }
            }
        };

        tracing::debug!(
            url = %ctx.url,
            state = state.as_str(),
            status = response.status().as_u16(),
            "page response"
        );
        response
    }

    async fn render(
        &self,
        ctx: &RequestContext,
        session: &dyn SessionStore,
        page: PageDefinition,
        state: ResponseState,
        version: &str,
    ) -> Result<PageResponse, PageError> {
        if state == ResponseState::RawPassthrough {
            let props = self.builder.resolve_props(ctx, page).await?;
            let body = serde_json::to_string(&props)?;
            return Ok(response(
                StatusCode::OK,
                &[(CONTENT_TYPE.as_str(), JSON), (VARY.as_str(), VARY_SIGNALS)],
                body,
            ));
        }

        let object = self.builder.build(ctx, page, session, version).await?;
        let json = object.to_json()?;

        if state == ResponseState::PageObject {
            return Ok(response(
                StatusCode::OK,
                &[
                    (CONTENT_TYPE.as_str(), JSON),
                    (VARY.as_str(), VARY_SIGNALS),
                    (header_names::X_INERTIA, "true"),
                    (header_names::X_INERTIA_VERSION, version),
                ],
                json,
            ));
        }

        let Some(renderer) = &self.renderer else {
            return Err(PageError::Render("no document renderer configured".into()));
        };
        let assets = self.resolve_assets();
        let html = renderer.render(&object, &json, &assets).await?;
        Ok(response(
            StatusCode::OK,
            &[(CONTENT_TYPE.as_str(), HTML), (VARY.as_str(), VARY_SIGNALS)],
            html,
        ))
    }

    fn resolve_assets(&self) -> AssetRefs {
        match self.versioner.resolve(&self.config.assets.entry) {
            Ok(assets) => assets,
            Err(e) => {
                tracing::warn!(entry = %self.config.assets.entry, error = %e, "asset entry unresolved");
                AssetRefs::default()
            }
        }
    }
}

fn is_stale(ctx: &RequestContext, version: &str) -> bool {
    ctx.protocol && ctx.is_safe_navigation() && ctx.version.as_deref().unwrap_or_default() != version
}

fn stale_response(ctx: &RequestContext, version: &str) -> PageResponse {
    tracing::debug!(
        url = %ctx.url,
        client = ctx.version.as_deref().unwrap_or_default(),
        current = version,
        "stale client version"
    );
    response(
        StatusCode::CONFLICT,
        &[(header_names::X_INERTIA_LOCATION, ctx.url.as_str())],
        String::new(),
    )
}

fn redirect_response(ctx: &RequestContext, target: &str, external: bool) -> PageResponse {
    let external = external || is_cross_origin(target, ctx.host.as_deref(), ctx.scheme.as_deref());
    if external && ctx.protocol {
        return response(
            StatusCode::CONFLICT,
            &[(header_names::X_INERTIA_LOCATION, target)],
            String::new(),
        );
    }
    let status = if ctx.method == Method::GET || ctx.method == Method::HEAD {
        StatusCode::FOUND
    } else {
        StatusCode::SEE_OTHER
    };
    response(status, &[(LOCATION.as_str(), target)], String::new())
}

/// Whether `target` points at another origin than `host`.
///
/// Relative targets never do. An absolute target with no known host is
/// treated as foreign. Schemes are compared when both are known and missing
/// ports read as the scheme's default.
fn is_cross_origin(target: &str, host: Option<&str>, scheme: Option<&str>) -> bool {
    if !(target.starts_with("http://") || target.starts_with("https://") || target.starts_with("//")) {
        return false;
    }
    let (target_scheme, authority) = if let Some(rest) = target.strip_prefix("//") {
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        (None, authority.parse::<Authority>().ok())
    } else {
        match target.parse::<Uri>() {
            Ok(uri) => (
                uri.scheme_str().map(str::to_ascii_lowercase),
                uri.authority().cloned(),
            ),
            Err(_) => return true,
        }
    };
    let host = host.and_then(|h| h.parse::<Authority>().ok());
    let (Some(authority), Some(host)) = (authority, host) else {
        return true;
    };

    let request_scheme = scheme.map(str::to_ascii_lowercase);
    if let (Some(target_scheme), Some(request_scheme)) = (&target_scheme, &request_scheme) {
        if target_scheme != request_scheme {
            return true;
        }
    }
    let scheme = target_scheme.or(request_scheme);
    let port = |a: &Authority| {
        a.port_u16()
            .or_else(|| scheme.as_deref().and_then(default_port))
    };
    !authority.host().eq_ignore_ascii_case(host.host()) || port(&authority) != port(&host)
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn server_error() -> PageResponse {
    response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &[(CONTENT_TYPE.as_str(), TEXT)],
        "Internal Server Error".to_string(),
    )
}

fn response(status: StatusCode, headers: &[(&str, &str)], body: String) -> PageResponse {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }
    response
}
