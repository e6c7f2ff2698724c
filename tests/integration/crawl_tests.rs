//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end against a temporary store.

use spider_walker::config::{
    Config, CrawlerConfig, EmbeddingConfig, ExtractionConfig, OutputConfig, ScopeConfig,
    SinkConfig, UserAgentConfig,
};
use spider_walker::crawler::Coordinator;
use spider_walker::state::ResumeLog;
use spider_walker::storage::{lock_storage, SqliteStorage, Storage};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration rooted in a temporary directory
fn create_test_config(seeds: Vec<String>, dir: &TempDir) -> Config {
    Config {
        seeds,
        crawler: CrawlerConfig {
            max_depth: 2,
            workers: 3,
            max_retries: 3,
            retry_base_delay_ms: 10,
            max_retry_delay_ms: 50,
            request_timeout_secs: 5,
            shutdown_grace_secs: 2,
            ..CrawlerConfig::default()
        },
        scope: ScopeConfig::default(),
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        extraction: ExtractionConfig::default(),
        embedding: EmbeddingConfig {
            dimensions: 32,
            ..EmbeddingConfig::default()
        },
        output: OutputConfig {
            database_path: dir.path().join("crawl.db").display().to_string(),
            resume_log_path: dir.path().join("resume.jsonl").display().to_string(),
            sink: SinkConfig::None,
        },
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

fn open_store(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        &format!(
            r#"<h1>Home</h1><p>Welcome to the home page</p>
            <a href="{base}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="/report.pdf">Annual report</a>
            <a href="/search?q=rust">Search</a>
            <img src="/logo.png">"#
        ),
    )
    .await;
    mount_page(
        &server,
        "/page1",
        r#"<p>First page content</p>
        <table><tr><th>Year</th><th>Count</th></tr><tr><td>2024</td><td>7</td></tr></table>"#,
    )
    .await;
    mount_page(
        &server,
        "/page2",
        r#"<p>Second page content</p>
        <form action="/submit" method="post"><input type="text" name="q"></form>"#,
    )
    .await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    let mut coordinator = Coordinator::new(config.clone(), true).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.status, "completed");
    assert_eq!(summary.targets_visited, 3);
    assert_eq!(summary.documents_stored, 3);
    assert_eq!(summary.total_errors(), 0);
    // The PDF link and the query-string link are recorded, never fetched
    assert_eq!(summary.non_traversable_links, 2);

    let store = open_store(&config);
    let stats = store.statistics().unwrap();
    assert_eq!(stats.documents, 3);
    assert_eq!(stats.tables, 1);
    assert_eq!(stats.forms, 1);
    assert_eq!(stats.images, 1);
    assert_eq!(stats.non_html_links, 1);
    assert_eq!(stats.pending_frontier, 0);
    assert_eq!(stats.missing_embeddings, 0);

    let run = store.get_latest_run().unwrap().unwrap();
    assert!(run.finished_at.is_some());
    assert!(run.summary.is_some());
}

#[tokio::test]
async fn test_same_domain_scope_skips_other_hosts() {
    let server = MockServer::start().await;
    let base = server.uri();
    let port = url::Url::parse(&base).unwrap().port().unwrap();
    let dir = TempDir::new().unwrap();

    // Same server, but "localhost" is a different registrable domain from 127.0.0.1
    mount_page(
        &server,
        "/",
        &format!(
            r#"<p>Seed page</p>
            <a href="/inside">Inside</a>
            <a href="http://localhost:{port}/outside">Outside</a>"#
        ),
    )
    .await;
    mount_page(&server, "/inside", "<p>Inside page</p>").await;
    Mock::given(method("GET"))
        .and(path("/outside"))
        .respond_with(html("<p>Outside page</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    let summary = Coordinator::new(config, true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.targets_visited, 2);
    assert_eq!(summary.documents_stored, 2);
}

#[tokio::test]
async fn test_rate_limited_target_is_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    mount_page(&server, "/", "<p>Finally served</p>").await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    let summary = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.retries, 3);
    assert_eq!(summary.documents_stored, 1);
    assert_eq!(summary.targets_visited, 1);
    assert_eq!(summary.total_errors(), 0);
    assert_eq!(open_store(&config).statistics().unwrap().documents, 1);
}

#[tokio::test]
async fn test_rate_limit_retries_exhausted() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let mut config = create_test_config(vec![format!("{}/", base)], &dir);
    config.crawler.max_retries = 2;
    let summary = Coordinator::new(config, true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.retries, 2);
    assert_eq!(summary.documents_stored, 0);
    assert_eq!(summary.errors_by_kind.get("too_many_requests"), Some(&1));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<p>Root</p><a href="/a">A</a>"#).await;
    mount_page(&server, "/a", "<p>Page a</p><img src=\"/a.png\">").await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    let first = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();
    let before = open_store(&config).statistics().unwrap();

    let second = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();
    let after = open_store(&config).statistics().unwrap();

    assert_eq!(first.documents_stored, 2);
    assert_eq!(second.documents_stored, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_link_names_and_referrers_merge() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<p>Root</p><a href="/other">Other</a><a href="/target">A</a>"#,
    )
    .await;
    mount_page(&server, "/other", r#"<p>Other page</p><a href="/target">B</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/target"))
        .respond_with(html("<p>Target page</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();

    let record = open_store(&config)
        .get_link_record(&format!("{}/target", base))
        .unwrap()
        .unwrap();

    let names: Vec<&str> = record.names.iter().map(String::as_str).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(record.linked_from.contains(&format!("{}/", base)));
    assert!(record.linked_from.contains(&format!("{}/other", base)));
    assert_eq!(record.classification, "internal");
}

#[tokio::test]
async fn test_shared_link_fetched_once_across_workers() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    let hubs: Vec<String> = (0..12).map(|i| format!("/hub{}", i)).collect();
    let root_links: String = hubs
        .iter()
        .map(|hub| format!(r#"<a href="{}">{}</a>"#, hub, hub))
        .collect();
    mount_page(&server, "/", &format!("<p>Index</p>{}", root_links)).await;

    for hub in &hubs {
        Mock::given(method("GET"))
            .and(path(hub.as_str()))
            .respond_with(html(&format!(
                r#"<p>Hub {}</p><a href="/shared">Shared</a><a href="/shared/">Shared again</a>"#,
                hub
            )))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(html("<p>Shared page</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(vec![format!("{}/", base)], &dir);
    config.crawler.workers = 6;
    let summary = Coordinator::new(config.clone(), true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.targets_visited, 14);
    assert_eq!(summary.status, "completed");

    let record = open_store(&config)
        .get_link_record(&format!("{}/shared", base))
        .unwrap()
        .unwrap();
    assert_eq!(record.linked_from.len(), 12);
}

#[tokio::test]
async fn test_write_failure_drops_document_atomically() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<p>Root without images</p><a href="/pictures">Pictures</a>"#,
    )
    .await;
    mount_page(&server, "/pictures", r#"<p>Gallery</p><img src="/cat.png">"#).await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    let mut coordinator = Coordinator::new(config.clone(), true).unwrap();

    // Every commit that carries an image now fails
    let conn = rusqlite::Connection::open(&config.output.database_path).unwrap();
    conn.execute_batch("DROP TABLE images").unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.documents_stored, 1);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.errors_by_kind.get("write_failed"), Some(&1));

    let documents: i64 = conn
        .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
        .unwrap();
    assert_eq!(documents, 1);
    let gallery_links: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM documents WHERE url LIKE '%/pictures'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(gallery_links, 0);
}

#[tokio::test]
async fn test_resume_log_skips_visited_urls() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<p>Root</p><a href="/done">Done</a><a href="/todo">Todo</a>"#,
    )
    .await;
    mount_page(&server, "/todo", "<p>Still to do</p>").await;
    Mock::given(method("GET"))
        .and(path("/done"))
        .respond_with(html("<p>Already done</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    {
        let mut log = ResumeLog::open(Path::new(&config.output.resume_log_path), true).unwrap();
        log.append(&format!("{}/done", base)).unwrap();
    }

    let summary = Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.targets_visited, 2);

    let entries = ResumeLog::load(Path::new(&config.output.resume_log_path)).unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn test_local_sink_mirrors_stored_documents() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<p>Root</p><a href="/a">A</a>"#).await;
    mount_page(&server, "/a", "<p>Page a</p>").await;

    let sink_dir = dir.path().join("documents");
    let mut config = create_test_config(vec![format!("{}/", base)], &dir);
    config.output.sink = SinkConfig::Local {
        path: sink_dir.display().to_string(),
    };

    let mut coordinator = Coordinator::new(config, true).unwrap();
    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.sink_failed, 0);

    let storage = coordinator.storage();
    let store = lock_storage(&storage);
    let files: Vec<_> = std::fs::read_dir(&sink_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 2);

    for file in files {
        let fingerprint = file.file_stem().unwrap().to_str().unwrap().to_string();
        assert!(store.has_fingerprint(&fingerprint).unwrap());
    }
}

#[tokio::test]
async fn test_depth_zero_fetches_seeds_only() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<p>Root</p><a href="/deeper">Deeper</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/deeper"))
        .respond_with(html("<p>Deeper page</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(vec![format!("{}/", base)], &dir);
    config.crawler.max_depth = 0;
    let summary = Coordinator::new(config, true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.targets_visited, 1);
    assert_eq!(summary.documents_stored, 1);
}

#[tokio::test]
async fn test_http_errors_are_counted_by_kind() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<p>Root</p><a href="/missing">Missing</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = create_test_config(vec![format!("{}/", base)], &dir);
    let summary = Coordinator::new(config, true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.documents_stored, 1);
    assert_eq!(summary.errors_by_kind.get("http_error"), Some(&1));
    assert_eq!(summary.status, "completed");
}
