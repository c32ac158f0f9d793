//! Integration tests for the Reddit scraper
//!
//! These tests use wiremock to stand in for both the OAuth token endpoint and
//! the API root, and drive the scraper through the full resilience stack.

use forum_harvester::config::Config;
use forum_harvester::model::ScrapeOptions;
use forum_harvester::resilience::{CircuitState, ErrorCode, ResilienceRegistry};
use forum_harvester::{Platform, Scraper};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing both Reddit endpoints at `server`
fn create_test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.reddit.base_url = server.uri();
    config.reddit.auth_url = format!("{}/api/v1/access_token", server.uri());
    config.reddit.client_id = Some("client".to_string());
    config.reddit.client_secret = Some("secret".to_string());
    config.reddit.requests_per_second = 1000;
    config.reddit.rate_limit_per_minute = 60_000;
    config.client.retry_attempts = 1;
    config.retry.initial_delay_ms = 10;
    config.retry.jitter = false;
    config
}

fn create_scraper(config: &Config) -> Scraper {
    let registry = Arc::new(ResilienceRegistry::new(config.circuit_breaker_config()));
    Scraper::new(Platform::Reddit, config, registry).expect("Failed to build scraper")
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "token_type": "bearer", "expires_in": 3600})),
        )
        .mount(server)
        .await;
}

fn post(id: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "name": format!("t3_{}", id),
            "title": format!("Post {}", id),
            "selftext": "",
            "author": "ferris",
            "author_fullname": "t2_ferris",
            "url": format!("https://example.com/{}", id),
            "permalink": format!("/r/rust/comments/{}/post/", id),
            "score": 10,
            "num_comments": 3,
            "created_utc": 1700000000.0,
            "edited": false,
            "subreddit": "rust",
            "is_self": false
        }
    })
}

fn listing(children: Vec<Value>, after: Option<&str>) -> Value {
    json!({
        "kind": "Listing",
        "data": {"children": children, "after": after, "before": null}
    })
}

fn comment(id: &str, replies: Value) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "author": "crab",
            "body": format!("comment {}", id),
            "score": 1,
            "created_utc": 1700000100.0,
            "replies": replies
        }
    })
}

#[tokio::test]
async fn test_category_pages_until_limit() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let first: Vec<Value> = (0..100).map(|i| post(&format!("a{}", i))).collect();
    let second: Vec<Value> = (0..60).map(|i| post(&format!("b{}", i))).collect();

    // The cursor-bearing request is mounted first so it takes precedence
    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .and(query_param("after", "t3_a99"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(second, Some("t3_b59"))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .and(query_param("limit", "100"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(first, Some("t3_a99"))))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    let result = scraper
        .scrape_category("r/rust", &ScrapeOptions::with_limit(150))
        .await;

    assert!(result.errors().is_empty(), "errors: {:?}", result.errors());
    assert_eq!(result.posts().len(), 150);
    assert_eq!(result.posts()[0].id, "a0");
    assert_eq!(result.posts()[149].id, "b49");
    assert_eq!(result.posts()[0].category.as_deref(), Some("rust"));

    let meta = result.metadata();
    assert!(meta.has_more);
    assert_eq!(meta.next_cursor.as_deref(), Some("t3_b59"));
}

#[tokio::test]
async fn test_short_page_ends_listing() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/top"))
        .and(query_param("t", "week"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(listing(vec![post("x1"), post("x2")], Some("t3_x2"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    let mut options = ScrapeOptions::with_limit(10);
    options.sort_by = "top".parse().unwrap();
    options.time_range = "week".parse().unwrap();

    let result = scraper.scrape_category("rust", &options).await;
    assert_eq!(result.posts().len(), 2);
    assert!(!result.metadata().has_more);
    assert!(result.metadata().next_cursor.is_none());
}

#[tokio::test]
async fn test_expired_token_reauthenticates_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "expires_in": 3600})))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/by_id/t3_abc"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/by_id/t3_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("abc")], None)))
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    let post = scraper.scrape_post("t3_abc").await.unwrap().unwrap();

    assert_eq!(post.id, "abc");
    assert_eq!(post.author_id.as_deref(), Some("t2_ferris"));
    assert!(scraper.is_auth_valid());
}

#[tokio::test]
async fn test_missing_credentials_is_collected_auth_error() {
    let server = MockServer::start().await;
    let mut config = create_test_config(&server);
    config.reddit.client_id = None;

    let scraper = create_scraper(&config);
    let result = scraper.scrape_category("rust", &ScrapeOptions::default()).await;

    assert!(result.posts().is_empty());
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].code, ErrorCode::Auth);
}

#[tokio::test]
async fn test_comment_thread_order_and_depth() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let more = json!({"kind": "more", "data": {"id": "zz", "children": ["q1", "q2"]}});
    let thread = listing(
        vec![
            comment(
                "a",
                listing(
                    vec![comment("c", listing(vec![comment("d", json!(""))], None))],
                    None,
                ),
            ),
            comment("b", json!("")),
            more,
        ],
        None,
    );

    Mock::given(method("GET"))
        .and(path("/comments/abc"))
        .and(query_param("depth", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([listing(vec![post("abc")], None), thread])))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    let mut options = ScrapeOptions::default();
    options.max_depth = 1;

    let result = scraper.scrape_comments("abc", &options).await;
    assert!(result.errors().is_empty(), "errors: {:?}", result.errors());

    let ids: Vec<&str> = result.comments().iter().map(|c| c.id.as_str()).collect();
    let depths: Vec<u32> = result.comments().iter().map(|c| c.depth).collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
    assert_eq!(depths, vec![0, 1, 0]);
    assert_eq!(result.comments()[1].parent_id.as_deref(), Some("a"));
    assert!(result.comments().iter().all(|c| c.post_id == "abc"));
}

#[tokio::test]
async fn test_thread_skips_placeholders_and_collects_bad_comments() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let more = json!({"kind": "more", "data": {"id": "m1", "count": 40, "children": ["q1", "q2"]}});
    let broken = json!({"kind": "t1", "data": {"id": "broken", "body": "no timestamp", "replies": ""}});
    let thread = listing(
        vec![
            comment("a", listing(vec![comment("c", json!("")), more.clone(), broken], None)),
            comment("b", json!("")),
            more,
        ],
        None,
    );

    Mock::given(method("GET"))
        .and(path("/comments/xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([listing(vec![post("xyz")], None), thread])))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    let result = scraper.scrape_comments("xyz", &ScrapeOptions::default()).await;

    let ids: Vec<&str> = result.comments().iter().map(|c| c.id.as_str()).collect();
    let depths: Vec<u32> = result.comments().iter().map(|c| c.depth).collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
    assert_eq!(depths, vec![0, 1, 0]);
    assert_eq!(result.comments()[1].parent_id.as_deref(), Some("a"));

    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].code, ErrorCode::Permanent);
    assert!(!result.errors()[0].retryable);
    assert!(result.is_partial());
}

#[tokio::test]
async fn test_malformed_post_does_not_end_paging() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    // A full page of ten children, one of which cannot be decoded
    let mut first: Vec<Value> = (0..9).map(|i| post(&format!("a{}", i))).collect();
    first.push(json!({"kind": "t3", "data": {"title": "no id"}}));

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .and(query_param("after", "t3_a8"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("b0")], None)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(first, Some("t3_a8"))))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    let mut options = ScrapeOptions::with_limit(10);
    options.sort_by = "new".parse().unwrap();

    let result = scraper.scrape_category("rust", &options).await;
    assert_eq!(result.posts().len(), 10);
    assert_eq!(result.posts()[9].id, "b0");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].code, ErrorCode::Permanent);
}

#[tokio::test]
async fn test_missing_user_is_absent() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/user/ghost_user/about"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    assert!(scraper.scrape_user("u/ghost_user").await.unwrap().is_none());
    assert!(scraper.scrape_user("!").await.is_err());
}

#[tokio::test]
async fn test_user_profile() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/user/spez/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "t2",
            "data": {"id": "1w72", "name": "spez", "link_karma": 100, "comment_karma": 50, "created_utc": 1118030400.0}
        })))
        .mount(&server)
        .await;

    let scraper = create_scraper(&create_test_config(&server));
    let user = scraper.scrape_user("spez").await.unwrap().unwrap();
    assert_eq!(user.username, "spez");
    assert_eq!(user.karma, 150);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/popular/hot"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/popular/hot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("t1")], None)))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.client.retry_attempts = 3;
    let scraper = create_scraper(&config);

    let result = scraper.get_trending(&ScrapeOptions::with_limit(5)).await;
    assert!(result.errors().is_empty(), "errors: {:?}", result.errors());
    assert_eq!(result.posts().len(), 1);
}

#[tokio::test]
async fn test_open_breaker_stops_calls() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/flaky/hot"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.circuit_breaker.failure_threshold = 2;
    let registry = Arc::new(ResilienceRegistry::new(config.circuit_breaker_config()));
    let scraper = Scraper::new(Platform::Reddit, &config, Arc::clone(&registry)).unwrap();

    for _ in 0..2 {
        let result = scraper.scrape_category("flaky", &ScrapeOptions::default()).await;
        assert_eq!(result.errors()[0].code, ErrorCode::Network);
    }

    let result = scraper.scrape_category("flaky", &ScrapeOptions::default()).await;
    assert_eq!(result.errors()[0].code, ErrorCode::CircuitOpen);

    let state = registry
        .breaker_state("reddit:scrape_category(flaky)")
        .expect("breaker should exist");
    assert_eq!(state.state, CircuitState::Open);
}
