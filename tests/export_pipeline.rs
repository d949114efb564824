use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use yuque_export::crawl::{CancellationToken, Crawler, FixedDelay};
use yuque_export::{
    Config, DownloadJob, ExportError, FetchError, JobStatus, ProgressSnapshot, RemoteSource,
    RetryPolicy, SessionClient, YuqueFetcher,
};

static PIC_JPG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

const COOKIE: &str = "_yuque_session=abc123";

struct TestServer {
    base_url: String,
    cookies: mpsc::Receiver<(String, Option<String>)>,
    shutdown: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl TestServer {
    fn stop(self) -> Vec<(String, Option<String>)> {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
        self.cookies.try_iter().collect()
    }
}

const TEAM_NOTES: &str = r#"{"book":{"id":42,"name":"Team Notes","description":"demo","toc":[
    {"uuid":"d1","title":"Intro","type":"DOC","url":"intro","parent_uuid":"","child_uuid":"","depth":1},
    {"uuid":"g1","title":"Guide","type":"TITLE","url":"","parent_uuid":"","child_uuid":"d2","depth":1},
    {"uuid":"d2","title":"Setup","type":"DOC","url":"setup","parent_uuid":"g1","child_uuid":"","depth":2},
    {"uuid":"d3","title":"Broken","type":"DOC","url":"broken","parent_uuid":"g1","child_uuid":"","depth":2}
]}}"#;

/// `flaky` answers 503 twice before succeeding, `down` always answers 503, `broken` is a 404.
const UNSTABLE: &str = r#"{"book":{"id":7,"name":"Unstable","toc":[
    {"uuid":"a","title":"Flaky","type":"DOC","url":"flaky"},
    {"uuid":"b","title":"Down","type":"DOC","url":"down"},
    {"uuid":"c","title":"Broken","type":"DOC","url":"broken"}
]}}"#;

fn book_page(payload: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>Team Notes · 语雀</title></head>
  <body>
    <script>window.appData = JSON.parse(decodeURIComponent("{}"));</script>
  </body>
</html>
"#,
        urlencoding::encode(payload)
    )
}

fn doc_json(base_url: &str, slug: &str) -> String {
    let source = match slug {
        "intro" => format!(
            "# Intro\n\n![pic]({base_url}/img/pic.jpg?size=2#frag)\n\n![gone]({base_url}/img/missing.png)\n\n![local](./assets/kept.png)\n"
        ),
        _ => format!("# {slug}\n\nPlain text.\n"),
    };
    serde_json::json!({
        "data": { "id": 1, "slug": slug, "title": slug, "sourcecode": source }
    })
    .to_string()
}

fn spawn_book_server() -> TestServer {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let addr = server.server_addr();
    let base_url = format!("http://{addr}");

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let (cookie_tx, cookie_rx) = mpsc::channel();
    let server_base = base_url.clone();
    let mut hits: HashMap<String, u32> = HashMap::new();

    let handle = thread::spawn(move || loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let request = match server.recv_timeout(Duration::from_millis(50)) {
            Ok(Some(req)) => req,
            Ok(None) => continue,
            Err(_) => break,
        };

        let url = request.url().to_string();
        let path = url.split('?').next().unwrap_or(&url).to_string();
        let cookie = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Cookie"))
            .map(|h| h.value.as_str().to_string());
        let _ = cookie_tx.send((path.clone(), cookie));

        let (status, body): (u16, Vec<u8>) = match path.as_str() {
            "/u1024/team-notes" => (200, book_page(TEAM_NOTES).into_bytes()),
            "/u1024/unstable" => (200, book_page(UNSTABLE).into_bytes()),
            "/u1024/no-data" => (
                200,
                b"<html><head><title>Empty</title></head></html>".to_vec(),
            ),
            "/api/docs/intro" | "/api/docs/setup" => {
                let slug = path.trim_start_matches("/api/docs/");
                (200, doc_json(&server_base, slug).into_bytes())
            }
            "/api/docs/flaky" => {
                let seen = hits.entry(path.clone()).or_insert(0);
                *seen += 1;
                if *seen <= 2 {
                    (503, b"busy".to_vec())
                } else {
                    (200, doc_json(&server_base, "flaky").into_bytes())
                }
            }
            "/api/docs/down" => (503, b"busy".to_vec()),
            "/img/pic.jpg" => (200, PIC_JPG.to_vec()),
            _ => (404, b"not found".to_vec()),
        };

        let response = tiny_http::Response::from_data(body).with_status_code(status);
        let _ = request.respond(response);
    });

    TestServer {
        base_url,
        cookies: cookie_rx,
        shutdown: shutdown_tx,
        handle,
    }
}

fn fetcher(base_url: &str) -> YuqueFetcher {
    let client = SessionClient::builder()
        .credential(COOKIE)
        .timeout_secs(5)
        .build()
        .expect("build client");
    YuqueFetcher::new(client).with_api_base(base_url)
}

fn job(url: String, output_dir: &Path) -> DownloadJob {
    DownloadJob {
        url,
        credential: COOKIE.to_string(),
        output_dir: output_dir.to_path_buf(),
        config: Config {
            delay_min_secs: 0,
            delay_max_secs: 0,
            ..Config::default()
        },
    }
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current).expect("read dir") {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

#[test]
fn exports_book_tree_with_local_images() {
    let server = spawn_book_server();
    let tmp = tempfile::tempdir().expect("tempdir");
    let fetcher = fetcher(&server.base_url);
    let snapshots = std::cell::RefCell::new(Vec::new());
    let observer = |s: ProgressSnapshot| snapshots.borrow_mut().push(s);

    let last = Crawler::new(&fetcher, FixedDelay::default())
        .run(
            job(format!("{}/u1024/team-notes", server.base_url), tmp.path()),
            &observer,
            &CancellationToken::new(),
        )
        .expect("export succeeds");

    let requests = server.stop();

    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.book_title, "Team Notes");
    assert_eq!(last.total_docs, 4);
    assert_eq!(last.finished_docs, 2);
    assert_eq!(last.percentage, 50.0);
    assert_eq!(
        snapshots.borrow().first().map(|s| s.book_title.clone()),
        Some("team-notes-Team Notes".to_string())
    );

    let book_dir = tmp.path().join("Team-Notes");
    let intro = fs::read_to_string(book_dir.join("Intro.md")).expect("read Intro.md");
    assert!(intro.contains("![pic](./assets/image-"), "{intro}");
    assert!(!intro.contains("size=2"), "{intro}");
    assert!(intro.contains("/img/missing.png)"), "{intro}");
    assert!(intro.contains("![local](./assets/kept.png)"), "{intro}");

    let setup = fs::read_to_string(book_dir.join("Guide").join("Setup.md")).expect("read Setup.md");
    assert!(setup.starts_with("# setup"));
    assert!(!book_dir.join("Guide").join("Broken.md").exists());

    let images: Vec<PathBuf> = files_under(&book_dir.join("assets"));
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].extension().and_then(|e| e.to_str()), Some("jpg"));
    assert_eq!(fs::read(&images[0]).expect("read image"), PIC_JPG);

    let summary = fs::read_to_string(book_dir.join("SUMMARY.md")).expect("read SUMMARY.md");
    assert_eq!(
        summary,
        "* [Intro](Intro.md)\n## Guide\n  * [Setup](Guide/Setup.md)\n"
    );

    assert!(!requests.is_empty());
    for (path, cookie) in &requests {
        assert_eq!(cookie.as_deref(), Some(COOKIE), "missing cookie on {path}");
    }
    assert!(requests.iter().any(|(p, _)| p == "/api/docs/broken"));
}

#[test]
fn page_without_payload_fails_the_job() {
    let server = spawn_book_server();
    let tmp = tempfile::tempdir().expect("tempdir");
    let fetcher = fetcher(&server.base_url);
    let snapshots = std::cell::RefCell::new(Vec::new());
    let observer = |s: ProgressSnapshot| snapshots.borrow_mut().push(s);

    let result = Crawler::new(&fetcher, FixedDelay::default()).run(
        job(format!("{}/u1024/no-data", server.base_url), tmp.path()),
        &observer,
        &CancellationToken::new(),
    );
    server.stop();

    assert!(matches!(
        result,
        Err(ExportError::Fetch(FetchError::Extraction { .. }))
    ));
    let snapshots = snapshots.borrow();
    let last = snapshots.last().expect("terminal snapshot");
    assert_eq!(last.status, JobStatus::Error);
    assert!(last
        .error
        .as_deref()
        .is_some_and(|m| m.contains("fetch book data")));
    assert_eq!(fs::read_dir(tmp.path()).expect("read tmp").count(), 0);
}

#[test]
fn fetch_errors_carry_status_codes() {
    let server = spawn_book_server();
    let fetcher = fetcher(&server.base_url);

    let title = fetcher.fetch_book_title(&format!("{}/missing", server.base_url));
    let document = fetcher.fetch_document(42, "broken");
    let asset = fetcher.download_asset(&format!("{}/img/pic.jpg", server.base_url));
    server.stop();

    assert_eq!(title.err().and_then(|e| e.status()), Some(404));
    assert_eq!(document.err().and_then(|e| e.status()), Some(404));
    assert_eq!(asset.expect("asset downloads"), PIC_JPG);
}

#[test]
fn transient_statuses_are_retried_up_to_the_configured_attempts() {
    let server = spawn_book_server();
    let tmp = tempfile::tempdir().expect("tempdir");
    let fetcher = fetcher(&server.base_url);
    let mut job = job(format!("{}/u1024/unstable", server.base_url), tmp.path());
    job.config.max_retries = 3;

    let last = Crawler::new(&fetcher, FixedDelay::default())
        .with_retry_policy(RetryPolicy::default().with_backoff_secs(vec![0]))
        .run(job, &|_: ProgressSnapshot| {}, &CancellationToken::new())
        .expect("export succeeds");
    let requests = server.stop();

    let count = |path: &str| requests.iter().filter(|(p, _)| p == path).count();
    assert_eq!(count("/api/docs/flaky"), 3);
    assert_eq!(count("/api/docs/down"), 3);
    assert_eq!(count("/api/docs/broken"), 1);
    assert_eq!(count("/u1024/unstable"), 2);

    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.finished_docs, 1);
    let book_dir = tmp.path().join("Unstable");
    assert!(book_dir.join("Flaky.md").exists());
    assert!(!book_dir.join("Down.md").exists());
    assert_eq!(
        fs::read_to_string(book_dir.join("SUMMARY.md")).expect("read SUMMARY.md"),
        "* [Flaky](Flaky.md)\n"
    );
}

#[test]
fn fetcher_makes_a_single_request_per_call() {
    let server = spawn_book_server();
    let fetcher = fetcher(&server.base_url);

    let result = fetcher.fetch_document(7, "down");
    let requests = server.stop();

    assert_eq!(result.err().and_then(|e| e.status()), Some(503));
    assert_eq!(
        requests
            .iter()
            .filter(|(p, _)| p == "/api/docs/down")
            .count(),
        1
    );
}
