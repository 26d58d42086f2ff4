mod common;

use common::http::{get, parse_response, send_request, workers_table};
use common::test_server::setup_may_runtime;
use common::webroot;
use smartserve::config::default_mime_types;
use smartserve::dispatcher::RequestDispatcher;
use smartserve::handlers::HandlerRegistry;
use smartserve::server::{ServerHandle, ServerSettings, SmartHttpServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn start_server(settings: ServerSettings) -> (TempDir, ServerHandle, SocketAddr) {
    setup_may_runtime();
    let root = webroot::build();
    let mut dispatcher = RequestDispatcher::new(
        root.path(),
        default_mime_types(),
        HandlerRegistry::with_builtins(),
    );
    dispatcher.mount_workers(&workers_table()).unwrap();
    let server = SmartHttpServer::new(settings, Arc::new(dispatcher));
    let handle = server.start("127.0.0.1:0").unwrap();
    handle.wait_ready().unwrap();
    let addr = handle.addr();
    (root, handle, addr)
}

fn test_settings() -> ServerSettings {
    ServerSettings {
        worker_threads: 4,
        ..ServerSettings::default()
    }
}

#[test]
fn test_static_file_served() {
    let (_root, handle, addr) = start_server(test_settings());
    let resp = get(&addr, "/hello.txt", None);
    handle.stop();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Type"), Some("text/plain; charset=UTF-8"));
    assert_eq!(resp.header("Content-Length"), Some("6"));
    assert_eq!(resp.body, "Hello\n");
}

#[test]
fn test_new_session_cookie() {
    let (_root, handle, addr) = start_server(test_settings());
    let resp = parse_response(&send_request(
        &addr,
        "GET / HTTP/1.1\r\nHost: example.org:8080\r\n\r\n",
    ));
    let sessions = Arc::clone(handle.sessions());
    handle.stop();

    assert_eq!(resp.status, 200);
    let cookies = resp.set_cookies();
    assert_eq!(cookies.len(), 1);
    let cookie = cookies[0];
    assert!(cookie.contains("; Domain=example.org"), "{cookie}");
    assert!(cookie.contains("; Path=/"), "{cookie}");
    assert!(cookie.ends_with("HttpOnly"), "{cookie}");
    let sid = resp.session_id().unwrap();
    assert_eq!(sid.len(), 20);
    assert!(sid.chars().all(|c| c.is_ascii_uppercase()));
    assert!(sessions.contains(&sid));
}

#[test]
fn test_cookie_domain_falls_back_to_config() {
    let settings = ServerSettings {
        domain: "smart.local".to_string(),
        ..test_settings()
    };
    let (_root, handle, addr) = start_server(settings);
    let resp = parse_response(&send_request(&addr, "GET /hello.txt HTTP/1.0\r\n\r\n"));
    handle.stop();
    assert_eq!(resp.status, 200);
    assert!(resp.set_cookies()[0].contains("; Domain=smart.local"));
}

#[test]
fn test_unusable_host_is_not_copied_into_cookie() {
    let settings = ServerSettings {
        domain: "smart.local".to_string(),
        ..test_settings()
    };
    let (_root, handle, addr) = start_server(settings);
    let resp = parse_response(&send_request(
        &addr,
        "GET /hello.txt HTTP/1.1\r\nHost: evil.test; Path=/x\r\n\r\n",
    ));
    handle.stop();
    assert_eq!(resp.status, 200);
    let cookie = resp.set_cookies()[0];
    assert!(cookie.contains("; Domain=smart.local; Path=/;"), "{cookie}");
    assert!(!cookie.contains("evil"), "{cookie}");
}

#[test]
fn test_session_continuity() {
    let (_root, handle, addr) = start_server(test_settings());
    let first = get(&addr, "/scripts/counter.smscr", None);
    let sid = first.session_id().unwrap();
    let second = get(&addr, "/scripts/counter.smscr", Some(&sid));
    let third = get(&addr, "/scripts/counter.smscr", None);
    handle.stop();

    assert_eq!(first.body, "count=1");
    assert_eq!(second.body, "count=2");
    assert!(second.set_cookies().is_empty());
    // a client without the cookie gets a fresh session
    assert_eq!(third.body, "count=1");
    assert_ne!(third.session_id().unwrap(), sid);
}

#[test]
fn test_unknown_session_is_replaced() {
    let (_root, handle, addr) = start_server(test_settings());
    let resp = get(&addr, "/hello.txt", Some("ABCDEFGHIJKLMNOPQRST"));
    handle.stop();
    let sid = resp.session_id().unwrap();
    assert_ne!(sid, "ABCDEFGHIJKLMNOPQRST");
}

#[test]
fn test_expired_session_is_replaced() {
    let settings = ServerSettings {
        session_timeout: Duration::from_secs(1),
        ..test_settings()
    };
    let (_root, handle, addr) = start_server(settings);
    let first = get(&addr, "/scripts/counter.smscr", None);
    let sid = first.session_id().unwrap();
    std::thread::sleep(Duration::from_millis(2100));
    let second = get(&addr, "/scripts/counter.smscr", Some(&sid));
    handle.stop();
    assert_eq!(second.body, "count=1");
    assert_ne!(second.session_id().unwrap(), sid);
}

#[test]
fn test_sweeper_evicts_abandoned_session() {
    let settings = ServerSettings {
        session_timeout: Duration::from_secs(1),
        sweep_interval: Duration::from_secs(1),
        ..test_settings()
    };
    let (_root, handle, addr) = start_server(settings);
    let sid = get(&addr, "/hello.txt", None).session_id().unwrap();
    let sessions = Arc::clone(handle.sessions());
    assert!(sessions.contains(&sid));

    // expiry is whole seconds, so allow a timeout plus two sweeps
    let deadline = Instant::now() + Duration::from_secs(5);
    while sessions.contains(&sid) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    handle.stop();
    assert!(!sessions.contains(&sid), "session {sid} was never swept");
    assert!(sessions.is_empty());
}

#[test]
fn test_status_codes() {
    let (_root, handle, addr) = start_server(test_settings());
    let forbidden = get(&addr, "/private/secret.txt", None);
    let traversal = get(&addr, "/../Cargo.toml", None);
    let missing = get(&addr, "/nope.html", None);
    let broken = get(&addr, "/scripts/broken.smscr", None);
    let unknown_handler = get(&addr, "/ext/Nobody", None);
    handle.stop();

    assert_eq!(forbidden.status, 403);
    assert_eq!(traversal.status, 403);
    assert_eq!(missing.status, 404);
    assert_eq!(broken.status, 500);
    assert_eq!(unknown_handler.status, 500);
    assert!(missing.header("Content-Type").unwrap().starts_with("text/html"));
    assert!(missing.body.contains("404"));
}

#[test]
fn test_internal_paths_forbidden_in_any_spelling() {
    let (_root, handle, addr) = start_server(test_settings());
    let spellings = [
        "/private/secret.txt",
        "/./private/secret.txt",
        "//private/secret.txt",
        "/%2e/private/secret.txt",
        "/%2E/private/pages/calc.smscr",
    ];
    let responses: Vec<_> = spellings.iter().map(|p| get(&addr, p, None)).collect();
    handle.stop();
    for (path, resp) in spellings.iter().zip(&responses) {
        assert_eq!(resp.status, 403, "{path}");
        assert!(resp.body.contains("403 Forbidden"), "{path}");
        assert_ne!(resp.body, "secret", "{path}");
    }
}

#[test]
fn test_empty_responses_still_send_header() {
    let (_root, handle, addr) = start_server(test_settings());
    let file = get(&addr, "/empty.txt", None);
    let script = get(&addr, "/scripts/empty.smscr", None);
    let no_rows = get(&addr, "/scripts/no_rows.smscr", None);
    handle.stop();

    assert_eq!(file.status, 200);
    assert_eq!(file.header("Content-Length"), Some("0"));
    assert_eq!(file.header("Content-Type"), Some("text/plain; charset=UTF-8"));
    for resp in [&file, &script, &no_rows] {
        assert_eq!(resp.status, 200, "{resp:?}");
        assert_eq!(resp.body, "", "{resp:?}");
        assert_eq!(resp.session_id().map(|sid| sid.len()), Some(20), "{resp:?}");
    }
}

#[test]
fn test_bad_requests() {
    let (_root, handle, addr) = start_server(test_settings());
    let post = parse_response(&send_request(&addr, "POST / HTTP/1.1\r\n\r\n"));
    let version = parse_response(&send_request(&addr, "GET / HTTP/2.0\r\n\r\n"));
    let garbage = parse_response(&send_request(&addr, "HELLO\r\n\r\n"));
    let query = get(&addr, "/scripts/params.smscr?name", None);
    let escape = get(&addr, "/scripts/params.smscr?name=%zz", None);
    handle.stop();

    for resp in [&post, &version, &garbage, &query, &escape] {
        assert_eq!(resp.status, 400, "{resp:?}");
    }
}

#[test]
fn test_header_limit() {
    let settings = ServerSettings {
        max_header_bytes: 64,
        ..test_settings()
    };
    let (_root, handle, addr) = start_server(settings);
    let resp = parse_response(&send_request(
        &addr,
        &format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(80)),
    ));
    let small = get(&addr, "/hello.txt", None);
    handle.stop();
    assert_eq!(resp.status, 400);
    assert_eq!(small.status, 200);
}

#[test]
fn test_query_parameters_reach_script() {
    let (_root, handle, addr) = start_server(test_settings());
    let resp = get(&addr, "/scripts/params.smscr?name=Ana+Marija&x=1", None);
    let encoded = get(&addr, "/scripts/params.smscr?name=J%C3%BCrgen", None);
    handle.stop();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "Hi Ana Marija");
    assert_eq!(encoded.body, "Hi Jürgen");
}

#[test]
fn test_lf_only_request() {
    let (_root, handle, addr) = start_server(test_settings());
    let resp = parse_response(&send_request(&addr, "GET /hello.txt HTTP/1.1\nHost: x\n\n"));
    handle.stop();
    assert_eq!(resp.status, 200);
}

#[test]
fn test_error_after_output_keeps_first_header() {
    let (_root, handle, addr) = start_server(test_settings());
    let raw = send_request(&addr, "GET /scripts/late_error.smscr HTTP/1.1\r\n\r\n");
    handle.stop();
    assert_eq!(raw.matches("HTTP/1.1 ").count(), 1);
    let resp = parse_response(&raw);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "partial");
}

#[test]
fn test_worker_with_nested_dispatch() {
    let (_root, handle, addr) = start_server(test_settings());
    let resp = get(&addr, "/calc?a=10&b=20", None);
    handle.stop();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "10+20=30 even.png");
}

#[test]
fn test_bg_color_persists_into_home() {
    let (_root, handle, addr) = start_server(test_settings());
    let set = get(&addr, "/ext/BgColorWorker?bgcolor=00aa00", None);
    let sid = set.session_id().unwrap();
    let home = get(&addr, "/home", Some(&sid));
    handle.stop();
    assert_eq!(set.status, 200);
    assert_eq!(home.body, "bg=00AA00");
}

#[test]
fn test_concurrent_clients() {
    let (_root, handle, addr) = start_server(test_settings());
    let threads: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(move || get(&addr, "/scripts/loop.smscr", None)))
        .collect();
    let responses: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    let sessions = handle.sessions().len();
    let submitted = handle.metrics().submitted();
    handle.stop();

    for resp in &responses {
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "1,2,3,");
    }
    assert_eq!(sessions, 8);
    // plus the readiness probe
    assert!(submitted >= 9);
}
