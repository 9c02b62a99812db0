//! End-to-end protocol behavior through `ResponseNegotiator`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::{Method, Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use turbo_assets::Manifest;
use turbo_page::{
    AlwaysPrecedence, AssetMode, AssetVersioner, FlashChannel, MemorySession, Outcome, PageConfig,
    PageDefinition, PageObject, PageResponse, PropSpec, Provider, RequestContext,
    ResponseNegotiator,
};

fn negotiator(version: &str) -> ResponseNegotiator {
    ResponseNegotiator::new(PageConfig::default(), AssetVersioner::fixed(version))
}

fn page_object(response: &PageResponse) -> PageObject {
    assert_eq!(response.status(), StatusCode::OK);
    PageObject::from_json(response.body()).unwrap()
}

/// Extract and unescape the `data-page` attribute of a rendered document.
fn embedded_page(html: &str) -> PageObject {
    let start = html.find("data-page=\"").unwrap() + "data-page=\"".len();
    let end = start + html[start..].find('"').unwrap();
    let json = html[start..end]
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    PageObject::from_json(&json).unwrap()
}

fn counting(counter: &Arc<AtomicUsize>, value: Value) -> Provider {
    let counter = counter.clone();
    Provider::from_fn(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    })
}

fn protocol_get(uri: &str, version: &str, headers: &[(&str, &str)]) -> RequestContext {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("Host", "shop.example.com")
        .header("X-Inertia", "true")
        .header("X-Inertia-Version", version);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    RequestContext::from_request(&builder.body(()).unwrap())
}

// === Version Tests ===

#[test]
fn manifest_version_tracks_content() {
    let m1 = Manifest::from_slice("m.json", br#"{"src/main.ts": {"file": "assets/main-1.js"}}"#).unwrap();
    let m2 = Manifest::from_slice("m.json", br#"{"src/main.ts": {"file": "assets/main-2.js"}}"#).unwrap();
    let m1_again =
        Manifest::from_slice("other.json", br#"{ "src/main.ts" : { "file" : "assets/main-1.js" } }"#).unwrap();

    assert_ne!(m1.version(), m2.version());
    assert_eq!(m1.version(), m1.version());
    assert_eq!(m1.version(), m1_again.version());
}

#[tokio::test]
async fn stale_client_gets_conflict_with_empty_body() {
    let calls = Arc::new(AtomicUsize::new(0));
    let page = PageDefinition::new("Home").prop("stats", PropSpec::once(counting(&calls, json!(1))));

    let ctx = protocol_get("/dashboard", "xyz", &[]);
    let response = negotiator("abc")
        .respond(&ctx, &MemorySession::new(), page.into())
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(response.body().is_empty());
    assert_eq!(
        response.headers().get("X-Inertia-Location").unwrap(),
        "/dashboard"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn built_manifest_change_makes_clients_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    std::fs::write(&path, r#"{"src/main.ts": {"file": "assets/main-1.js", "isEntry": true}}"#).unwrap();

    let mut config = PageConfig::default();
    config.assets.mode = AssetMode::Built;
    config.assets.manifest_path = path.clone();
    let old = ResponseNegotiator::from_config(config.clone()).unwrap();
    let old_version = old.version();

    std::fs::write(&path, r#"{"src/main.ts": {"file": "assets/main-2.js", "isEntry": true}}"#).unwrap();
    let new = ResponseNegotiator::from_config(config).unwrap();
    assert_ne!(new.version(), old_version);

    let ctx = protocol_get("/", &old_version, &[]);
    assert!(old.check_version(&ctx).is_none());
    let stale = new.check_version(&ctx).unwrap();
    assert_eq!(stale.status(), StatusCode::CONFLICT);
}

// === Loading Strategy Tests ===

#[tokio::test]
async fn lazy_prop_only_on_explicit_partial_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let negotiator = negotiator("v1");
    let session = MemorySession::new();
    let page = || {
        PageDefinition::new("Reports")
            .prop("title", json!("Reports"))
            .prop("a", PropSpec::lazy(counting(&calls, json!([1, 2, 3]))))
    };

    let full = page_object(&negotiator.respond(&protocol_get("/reports", "v1", &[]), &session, page().into()).await);
    assert!(!full.props.contains_key("a"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let ctx = protocol_get(
        "/reports",
        "v1",
        &[("X-Inertia-Partial-Component", "Reports"), ("X-Inertia-Partial-Data", "a")],
    );
    let partial = page_object(&negotiator.respond(&ctx, &session, page().into()).await);
    assert_eq!(partial.props.keys().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(partial.props["a"], json!([1, 2, 3]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn optional_prop_needs_its_exact_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let negotiator = negotiator("v1");
    let session = MemorySession::new();
    let page = || {
        PageDefinition::new("Reports")
            .prop("title", json!("Reports"))
            .prop("export", PropSpec::optional(counting(&calls, json!("csv"))))
    };

    let full = page_object(&negotiator.respond(&protocol_get("/reports", "v1", &[]), &session, page().into()).await);
    assert!(!full.props.contains_key("export"));

    let unnamed = protocol_get("/reports", "v1", &[("X-Inertia-Partial-Component", "Reports")]);
    let unnamed = page_object(&negotiator.respond(&unnamed, &session, page().into()).await);
    assert_eq!(unnamed.props.keys().collect::<Vec<_>>(), vec!["title"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let named = protocol_get(
        "/reports",
        "v1",
        &[("X-Inertia-Partial-Component", "Reports"), ("X-Inertia-Partial-Data", "export")],
    );
    let named = page_object(&negotiator.respond(&named, &session, page().into()).await);
    assert_eq!(named.props.keys().collect::<Vec<_>>(), vec!["export"]);
    assert_eq!(named.props["export"], json!("csv"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deferred_group_is_fetched_together() {
    let calls = Arc::new(AtomicUsize::new(0));
    let negotiator = negotiator("v1");
    let session = MemorySession::new();
    let page = || {
        PageDefinition::new("Dashboard")
            .prop("user", json!({"name": "Ann"}))
            .prop("x", PropSpec::deferred_in(counting(&calls, json!("x")), "G"))
            .prop("y", PropSpec::deferred_in(counting(&calls, json!("y")), "G"))
            .prop("z", PropSpec::deferred_in(counting(&calls, json!("z")), "H"))
    };

    let full = page_object(&negotiator.respond(&protocol_get("/", "v1", &[]), &session, page().into()).await);
    assert_eq!(full.props.keys().collect::<Vec<_>>(), vec!["user"]);
    assert_eq!(full.deferred_props["G"], vec!["x", "y"]);
    assert_eq!(full.deferred_props["H"], vec!["z"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let ctx = protocol_get(
        "/",
        "v1",
        &[("X-Inertia-Partial-Component", "Dashboard"), ("X-Inertia-Partial-Data", "x")],
    );
    let partial = page_object(&negotiator.respond(&ctx, &session, page().into()).await);
    assert_eq!(partial.props.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    assert_eq!(partial.props["y"], json!("y"));
    assert!(partial.deferred_props.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn merge_prop_carries_metadata_not_merged_value() {
    let new_slice = json!([{"id": 11, "title": "c"}, {"id": 12, "title": "d"}]);
    let page = PageDefinition::new("Feed").prop(
        "items",
        PropSpec::merge(new_slice.clone()).match_on("id"),
    );

    let ctx = protocol_get(
        "/feed?page=2",
        "v1",
        &[("X-Inertia-Partial-Component", "Feed"), ("X-Inertia-Partial-Data", "items")],
    );
    let object = page_object(&negotiator("v1").respond(&ctx, &MemorySession::new(), page.into()).await);

    assert_eq!(object.merge_props, vec!["items"]);
    assert_eq!(object.match_props_on["items"], vec!["id"]);
    assert_eq!(object.props["items"], new_slice);
    assert_eq!(object.url, "/feed?page=2");
}

#[tokio::test]
async fn component_mismatch_renders_in_full() {
    let page = PageDefinition::new("Dashboard")
        .prop("user", json!("Ann"))
        .prop("stats", PropSpec::lazy(Provider::from_fn(|| Ok(1))));

    let ctx = protocol_get(
        "/",
        "v1",
        &[("X-Inertia-Partial-Component", "Settings"), ("X-Inertia-Partial-Data", "stats")],
    );
    let object = page_object(&negotiator("v1").respond(&ctx, &MemorySession::new(), page.into()).await);
    assert_eq!(object.props.keys().collect::<Vec<_>>(), vec!["user"]);
}

#[tokio::test]
async fn malformed_partial_header_reads_as_empty() {
    let page = PageDefinition::new("Dashboard")
        .prop("user", json!("Ann"))
        .prop("team", json!("Core"));

    let ctx = protocol_get(
        "/",
        "v1",
        &[("X-Inertia-Partial-Component", "Dashboard"), ("X-Inertia-Partial-Data", "user, \"team")],
    );
    let object = page_object(&negotiator("v1").respond(&ctx, &MemorySession::new(), page.into()).await);
    assert_eq!(object.props.keys().collect::<Vec<_>>(), vec!["team", "user"]);
}

// === Always Precedence Tests ===

fn always_page() -> PageDefinition {
    PageDefinition::new("Dashboard")
        .prop("auth", PropSpec::always(json!({"id": 7})))
        .prop("user", json!("Ann"))
}

fn excluding_auth() -> RequestContext {
    protocol_get(
        "/",
        "v1",
        &[("X-Inertia-Partial-Component", "Dashboard"), ("X-Inertia-Partial-Except", "auth")],
    )
}

#[tokio::test]
async fn always_prop_survives_exclude_by_default() {
    let object = page_object(
        &negotiator("v1")
            .respond(&excluding_auth(), &MemorySession::new(), always_page().into())
            .await,
    );
    assert_eq!(object.props["auth"], json!({"id": 7}));
}

#[tokio::test]
async fn exclude_wins_when_configured() {
    let config = PageConfig::default().with_always_precedence(AlwaysPrecedence::ExcludeWins);
    let negotiator = ResponseNegotiator::new(config, AssetVersioner::fixed("v1"));
    let object = page_object(
        &negotiator
            .respond(&excluding_auth(), &MemorySession::new(), always_page().into())
            .await,
    );
    assert!(!object.props.contains_key("auth"));
    assert_eq!(object.props["user"], json!("Ann"));
}

// === Document Tests ===

#[tokio::test]
async fn plain_request_gets_document_with_immediate_props_only() {
    let calls = Arc::new(AtomicUsize::new(0));
    let page = PageDefinition::new("Users/Show")
        .prop("user", json!({"name": "Ann"}))
        .prop("stats", PropSpec::lazy(counting(&calls, json!(9))));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/users/1")
        .header("Accept", "text/html")
        .body(())
        .unwrap();
    let ctx = RequestContext::from_request(&request);
    let response = negotiator("v1")
        .respond(&ctx, &MemorySession::new(), page.into())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("Vary").unwrap(), "X-Inertia, Accept");
    let object = embedded_page(response.body());
    assert_eq!(object.component, "Users/Show");
    assert_eq!(
        serde_json::to_value(&object.props).unwrap(),
        json!({"user": {"name": "Ann"}})
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn page_object_round_trips() {
    let page = PageDefinition::new("Users/Index")
        .prop("users", json!([{"id": 1, "name": "Ann <admin>"}]))
        .prop("filters", json!({"q": "a&b"}));

    let response = negotiator("v1")
        .respond(&protocol_get("/users?q=a%26b", "v1", &[]), &MemorySession::new(), page.into())
        .await;
    let object = page_object(&response);
    let reparsed = PageObject::from_json(&object.to_json().unwrap()).unwrap();

    assert_eq!(reparsed.component, object.component);
    assert_eq!(reparsed.props, object.props);
    assert_eq!(reparsed.url, object.url);
    assert_eq!(reparsed.version, object.version);
}

// === Flash Tests ===

#[tokio::test]
async fn flash_reads_once_per_build() {
    let session = MemorySession::new();
    FlashChannel::new(&session).flash("success", "Saved").await.unwrap();

    let mut channel = FlashChannel::new(&session);
    let first = channel.take_flash().await;
    let second = channel.take_flash().await;
    assert_eq!(first["success"], vec!["Saved"]);
    assert!(second.is_empty());
}

#[tokio::test]
async fn flash_survives_redirect_and_is_shown_once() {
    let session = MemorySession::new();
    let negotiator = negotiator("v1");

    // POST handler stores a message and redirects.
    FlashChannel::new(&session).flash("success", "User created").await.unwrap();
    let post = RequestContext::new(Method::POST, "/users").protocol("v1");
    let redirect = negotiator.respond(&post, &session, Outcome::redirect("/users")).await;
    assert_eq!(redirect.status(), StatusCode::SEE_OTHER);

    let ctx = protocol_get("/users", "v1", &[]);
    let shown = page_object(&negotiator.respond(&ctx, &session, PageDefinition::new("Users/Index").into()).await);
    assert_eq!(shown.flash["success"], vec!["User created"]);

    let again = page_object(&negotiator.respond(&ctx, &session, PageDefinition::new("Users/Index").into()).await);
    assert!(again.flash.is_empty());
    assert_eq!(serde_json::to_value(&again).unwrap()["flash"], json!({}));
}

// === Concurrency Tests ===

#[tokio::test]
async fn provider_timeout_becomes_prop_error() {
    let config = PageConfig::default().with_provider_timeout(Duration::from_millis(30));
    let negotiator = ResponseNegotiator::new(config, AssetVersioner::fixed("v1"));
    let page = PageDefinition::new("Dashboard")
        .prop("fast", PropSpec::once(Provider::from_fn(|| Ok("ok"))))
        .prop(
            "slow",
            PropSpec::once(Provider::from_future(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok("late")
            })),
        );

    let object = page_object(
        &negotiator
            .respond(&protocol_get("/", "v1", &[]), &MemorySession::new(), page.into())
            .await,
    );
    assert_eq!(object.props["fast"], json!("ok"));
    assert_eq!(object.props["slow"], Value::Null);
    assert!(object.prop_errors["slow"].contains("timed out"));
}

#[tokio::test]
async fn blocking_provider_timeout_becomes_prop_error() {
    let config = PageConfig::default().with_provider_timeout(Duration::from_millis(30));
    let negotiator = ResponseNegotiator::new(config, AssetVersioner::fixed("v1"));
    let page = PageDefinition::new("Dashboard")
        .prop("fast", PropSpec::once(Provider::from_fn(|| Ok("ok"))))
        .prop(
            "slow",
            PropSpec::once(Provider::from_fn(|| {
                std::thread::sleep(Duration::from_millis(500));
                Ok("late")
            })),
        );

    let started = std::time::Instant::now();
    let object = page_object(
        &negotiator
            .respond(&protocol_get("/", "v1", &[]), &MemorySession::new(), page.into())
            .await,
    );
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(object.props["fast"], json!("ok"));
    assert_eq!(object.props["slow"], Value::Null);
    assert!(object.prop_errors["slow"].contains("timed out"));
}

#[tokio::test]
async fn always_timeout_fails_the_response() {
    let config = PageConfig::default().with_provider_timeout(Duration::from_millis(30));
    let negotiator = ResponseNegotiator::new(config, AssetVersioner::fixed("v1"));
    let page = PageDefinition::new("Dashboard").prop(
        "auth",
        PropSpec::always(Provider::from_future(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        })),
    );

    let response = negotiator
        .respond(&protocol_get("/", "v1", &[]), &MemorySession::new(), page.into())
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn dropping_the_request_cancels_providers() {
    let started = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let provider = {
        let (started, dropped, finished) = (started.clone(), dropped.clone(), finished.clone());
        Provider::from_future(move || async move {
            let _guard = SetOnDrop(dropped);
            started.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            finished.store(true, Ordering::SeqCst);
            Ok(1)
        })
    };
    let page = PageDefinition::new("Dashboard").prop("slow", PropSpec::once(provider));
    let negotiator = Arc::new(negotiator("v1"));

    let task = tokio::spawn(async move {
        let session = MemorySession::new();
        let ctx = RequestContext::new(Method::GET, "/").protocol("v1");
        negotiator.respond(&ctx, &session, page.into()).await
    });

    for _ in 0..100 {
        if started.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(started.load(Ordering::SeqCst));

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!finished.load(Ordering::SeqCst));
}

// === Shared Props Tests ===

#[tokio::test]
async fn shared_props_follow_partial_rules() {
    let negotiator = negotiator("v1").share(|_: &RequestContext| {
        let mut props = turbo_page::Props::new();
        props.insert("app".to_string(), PropSpec::immediate(json!("shop")));
        props.insert("auth".to_string(), PropSpec::always(json!({"id": 1})));
        props
    });
    let session = MemorySession::new();

    let full = page_object(
        &negotiator
            .respond(&protocol_get("/", "v1", &[]), &session, PageDefinition::new("Home").prop("a", json!(1)).into())
            .await,
    );
    assert_eq!(full.props.keys().collect::<Vec<_>>(), vec!["a", "app", "auth"]);

    let ctx = protocol_get(
        "/",
        "v1",
        &[("X-Inertia-Partial-Component", "Home"), ("X-Inertia-Partial-Data", "a")],
    );
    let partial = page_object(
        &negotiator
            .respond(&ctx, &session, PageDefinition::new("Home").prop("a", json!(1)).into())
            .await,
    );
    assert_eq!(partial.props.keys().collect::<Vec<_>>(), vec!["a", "auth"]);
}
