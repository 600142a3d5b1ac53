use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proposal_deck::assets::{AssetCache, AssetError, AssetOrigin, HttpFetcher};
use tiny_http::{Response, Server};

const JPEG_BODY: &[u8] = b"\xFF\xD8\xFF\xE0 pretend jpeg \xFF\xD9";

/// Serves `JPEG_BODY` on `/hero.jpg` and 404 everywhere else, counting every request.
fn spawn_server() -> (String, Arc<AtomicUsize>) {
    let server = Server::http("127.0.0.1:0").expect("bind test server");
    let address = server
        .server_addr()
        .to_ip()
        .expect("test server listens on TCP");
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        for request in server.incoming_requests() {
            counter.fetch_add(1, Ordering::SeqCst);
            let result = if request.url() == "/hero.jpg" {
                request.respond(Response::from_data(JPEG_BODY))
            } else {
                request.respond(Response::from_string("not found").with_status_code(404))
            };
            result.expect("respond to test request");
        }
    });

    (format!("http://{}", address), hits)
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(5)).expect("build HTTP client")
}

#[test]
fn downloads_once_then_serves_from_disk() {
    let (base, hits) = spawn_server();
    let dir = tempfile::tempdir().unwrap();
    let cache = AssetCache::new(dir.path().join("public/assets"), fetcher());
    let url = format!("{}/hero.jpg", base);

    let first = cache.resolve("hero", &url).unwrap();
    assert_eq!(
        first.origin,
        AssetOrigin::Downloaded {
            bytes: JPEG_BODY.len() as u64
        }
    );
    assert_eq!(first.local_path, dir.path().join("public/assets/hero.jpg"));
    assert_eq!(fs::read(&first.local_path).unwrap(), JPEG_BODY);

    let second = cache.resolve("hero", &url).unwrap();
    assert_eq!(second.origin, AssetOrigin::Cached);
    assert_eq!(second.local_path, first.local_path);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let files: Vec<_> = fs::read_dir(dir.path().join("public/assets"))
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn not_found_is_reported_and_nothing_is_cached() {
    let (base, hits) = spawn_server();
    let dir = tempfile::tempdir().unwrap();
    let cache = AssetCache::new(dir.path(), fetcher());

    let err = cache
        .resolve("missing", &format!("{}/missing.jpg", base))
        .unwrap_err();

    assert!(matches!(err, AssetError::Status { status: 404, .. }));
    assert!(!cache.cache_path("missing").unwrap().exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn unreachable_host_is_a_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let cache = AssetCache::new(dir.path(), fetcher());

    // Port 9 (discard) on loopback is not served by the test suite.
    let err = cache
        .resolve("offline", "http://127.0.0.1:9/offline.jpg")
        .unwrap_err();

    assert!(matches!(err, AssetError::Transport { .. }));
    assert!(!cache.cache_path("offline").unwrap().exists());
}
