use anyhow::{Result, bail};
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use usgs_api::models::DownloadRecord;
use usgs_api::{
    Body, DownloadItem, DownloadStatus, Downloader, Fetch, HttpFetcher, MAX_DOWNLOADS, Settings,
    lock_file_name, plan_downloads,
};

fn http_downloader() -> Downloader {
    Downloader::new(HttpFetcher::new(true).unwrap())
}

#[test]
fn mixed_success_and_http_error() {
    let mut server = mockito::Server::new();
    let ok = server
        .mock("GET", "/a")
        .with_status(200)
        .with_body("first file contents")
        .create();
    let broken = server.mock("GET", "/b").with_status(500).create();

    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        DownloadItem::new(format!("{}/a", server.url()), "a.zip"),
        DownloadItem::new(format!("{}/b", server.url()), "b.zip"),
    ];
    let results = http_downloader().download_all(&items, dir.path());

    ok.assert();
    broken.assert();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, DownloadStatus::Downloaded);
    assert_eq!(results[0].file_name, "a.zip");
    assert_eq!(results[1].status, DownloadStatus::Failed);
    assert_eq!(results[1].file_name, "b.zip");

    assert_eq!(
        std::fs::read(dir.path().join("a.zip")).unwrap(),
        b"first file contents"
    );
    assert!(!dir.path().join(".a.zip_lock").exists());
    assert!(!dir.path().join("b.zip").exists());
    // The GET failed before anything was written.
    assert!(!dir.path().join(".b.zip_lock").exists());
}

#[test]
fn rerun_overwrites_with_identical_content() {
    let mut server = mockito::Server::new();
    let body = vec![7u8; 256 * 1024];
    let mock = server
        .mock("GET", "/scene.tar.gz")
        .with_status(200)
        .with_body(body.clone())
        .expect(2)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let items = vec![DownloadItem::new(
        format!("{}/scene.tar.gz", server.url()),
        "scene.tar.gz",
    )];
    let downloader = http_downloader();

    for _ in 0..2 {
        let results = downloader.download_all(&items, dir.path());
        assert!(results[0].is_downloaded());
        assert_eq!(std::fs::read(dir.path().join("scene.tar.gz")).unwrap(), body);
    }
    mock.assert();

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["scene.tar.gz"]);
}

#[test]
fn results_follow_input_order() {
    let mut server = mockito::Server::new();
    let mut mocks = Vec::new();
    let mut items = Vec::new();
    for i in 0..12 {
        let path = format!("/f{}", i);
        let status = if i % 3 == 0 { 404 } else { 200 };
        mocks.push(
            server
                .mock("GET", path.as_str())
                .with_status(status)
                .with_body(format!("file {}", i))
                .create(),
        );
        items.push(DownloadItem::new(
            format!("{}{}", server.url(), path),
            format!("f{}.bin", i),
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let results = http_downloader()
        .with_max_workers(4)
        .download_all(&items, dir.path());

    for (i, (item, result)) in items.iter().zip(&results).enumerate() {
        assert_eq!(result.url, item.url);
        assert_eq!(result.file_name, item.file_name);
        assert_eq!(result.is_downloaded(), i % 3 != 0, "item {}", i);
    }
}

#[test]
fn stalled_transfer_times_out() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/stalled")
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(b"partial")?;
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(b" rest")
        })
        .create();

    let mut settings = Settings::with_url(server.url());
    settings.download_timeout = Some(Duration::from_millis(300));
    let downloader = Downloader::from_settings(&settings).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let results = downloader.download_all(
        &[DownloadItem::new(format!("{}/stalled", server.url()), "stalled.bin")],
        dir.path(),
    );

    assert_eq!(results[0].status, DownloadStatus::Failed);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!dir.path().join("stalled.bin").exists());
}

#[test]
fn no_items_no_requests() {
    let dir = tempfile::tempdir().unwrap();
    let results = http_downloader().download_all(&[], dir.path());
    assert!(results.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Counts transfers that are open at the same time.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    threads: Mutex<HashSet<String>>,
}

struct Tracked {
    inner: Cursor<Vec<u8>>,
    gauge: Arc<Gauge>,
}

impl Read for Tracked {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Holds every transfer open until `expected` of them overlap (or a
/// deadline passes), so a pool that runs fewer transfers at once shows up
/// as a lower peak.
struct Gated {
    gauge: Arc<Gauge>,
    expected: usize,
}

impl Fetch for Gated {
    fn open(&self, url: &str) -> Result<Body> {
        let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        self.gauge.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = std::thread::current().name() {
            self.gauge.threads.lock().unwrap().insert(name.to_string());
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while self.gauge.peak.load(Ordering::SeqCst) < self.expected && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        let data = url.as_bytes().to_vec();
        Ok(Body {
            content_length: Some(data.len() as u64),
            reader: Box::new(Tracked {
                inner: Cursor::new(data),
                gauge: self.gauge.clone(),
            }),
        })
    }
}

fn numbered_items(n: usize) -> Vec<DownloadItem> {
    (0..n)
        .map(|i| DownloadItem::new(format!("mem://item/{}", i), format!("item-{}.dat", i)))
        .collect()
}

fn run_gated(downloader_workers: Option<usize>, n: usize, expected: usize) -> (Arc<Gauge>, bool) {
    let gauge = Arc::new(Gauge::default());
    let mut downloader = Downloader::new(Gated {
        gauge: gauge.clone(),
        expected,
    });
    if let Some(m) = downloader_workers {
        downloader = downloader.with_max_workers(m);
    }
    let dir = tempfile::tempdir().unwrap();
    let items = numbered_items(n);

    let results = downloader.download_all(&items, dir.path());

    let all_written = results.len() == n
        && results.iter().all(|r| r.is_downloaded())
        && items.iter().all(|item| {
            std::fs::read(dir.path().join(&item.file_name)).unwrap() == item.url.as_bytes()
        });
    (gauge, all_written)
}

#[test]
fn default_pool_runs_ten_transfers_at_once() {
    let (gauge, all_written) = run_gated(None, 25, MAX_DOWNLOADS);

    assert!(all_written);
    assert_eq!(gauge.opened.load(Ordering::SeqCst), 25);
    assert_eq!(gauge.peak.load(Ordering::SeqCst), MAX_DOWNLOADS);
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
    assert_eq!(gauge.threads.lock().unwrap().len(), MAX_DOWNLOADS);
}

#[test]
fn custom_limit_is_reached_and_not_exceeded() {
    let (gauge, all_written) = run_gated(Some(3), 9, 3);

    assert!(all_written);
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    assert_eq!(gauge.threads.lock().unwrap().len(), 3);
}

#[test]
fn pool_shrinks_to_item_count() {
    let (gauge, all_written) = run_gated(Some(10), 3, 3);

    assert!(all_written);
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    let threads = gauge.threads.lock().unwrap();
    assert_eq!(threads.len(), 3);
    assert!(threads.iter().all(|t| t.starts_with("download-")));
}

#[test]
fn zero_workers_means_one() {
    let (gauge, all_written) = run_gated(Some(0), 5, 1);

    assert!(all_written);
    assert_eq!(gauge.opened.load(Ordering::SeqCst), 5);
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    assert_eq!(gauge.threads.lock().unwrap().len(), 1);
}

/// Checks the directory state from inside the transfer.
struct Watcher {
    dir: PathBuf,
    name: &'static str,
    checked: Arc<AtomicUsize>,
}

struct WatchingReader {
    chunks: Vec<&'static [u8]>,
    dir: PathBuf,
    name: &'static str,
    checked: Arc<AtomicUsize>,
}

impl Read for WatchingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.chunks.is_empty() {
            return Ok(0);
        }
        let lock = self.dir.join(lock_file_name(self.name));
        let target = self.dir.join(self.name);
        if lock.exists() && !target.exists() {
            self.checked.fetch_add(1, Ordering::SeqCst);
        }
        let chunk = self.chunks.remove(0);
        buf[..chunk.len()].copy_from_slice(chunk);
        Ok(chunk.len())
    }
}

impl Fetch for Watcher {
    fn open(&self, _url: &str) -> Result<Body> {
        Ok(Body {
            content_length: Some(9),
            reader: Box::new(WatchingReader {
                chunks: vec![b"abc", b"def", b"ghi"],
                dir: self.dir.clone(),
                name: self.name,
                checked: self.checked.clone(),
            }),
        })
    }
}

#[test]
fn final_name_appears_only_after_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let checked = Arc::new(AtomicUsize::new(0));
    let downloader = Downloader::new(Watcher {
        dir: dir.path().to_path_buf(),
        name: "LC08.tar.gz",
        checked: checked.clone(),
    });

    let results = downloader.download_all(
        &[DownloadItem::new("mem://scene", "LC08.tar.gz")],
        dir.path(),
    );

    assert!(results[0].is_downloaded());
    assert_eq!(checked.load(Ordering::SeqCst), 3);
    assert_eq!(
        std::fs::read(dir.path().join("LC08.tar.gz")).unwrap(),
        b"abcdefghi"
    );
    assert!(!dir.path().join(".LC08.tar.gz_lock").exists());
}

#[test]
fn interrupted_stream_leaves_lock_file() {
    struct Broken;
    struct FailingReader(bool);

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            self.0 = true;
            buf[..4].copy_from_slice(b"part");
            Ok(4)
        }
    }

    impl Fetch for Broken {
        fn open(&self, url: &str) -> Result<Body> {
            if url.is_empty() {
                bail!("no url");
            }
            Ok(Body {
                content_length: None,
                reader: Box::new(FailingReader(false)),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let results =
        Downloader::new(Broken).download_all(&[DownloadItem::new("mem://x", "x.zip")], dir.path());

    assert_eq!(results[0].status, DownloadStatus::Failed);
    assert!(!dir.path().join("x.zip").exists());
    assert_eq!(std::fs::read(dir.path().join(".x.zip_lock")).unwrap(), b"part");
}

#[test]
fn planned_records_download_under_product_names() {
    let mut server = mockito::Server::new();
    let path = "/ltaauth/LC08_L1TP_169019_20180101_20180104_01_T1.tar.gz";
    let mock = server
        .mock("GET", path)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("bundle")
        .create();

    let records: Vec<DownloadRecord> = serde_json::from_value(serde_json::json!([
        {
            "entityId": "LC81690192018001LGN00",
            "product": "STANDARD",
            "url": format!("{}{}?id=1", server.url(), path)
        },
        {
            "entityId": "LC81690192018001LGN00",
            "product": "FR_BUND",
            "url": format!("{}/other?id=2", server.url())
        }
    ]))
    .unwrap();

    let items = plan_downloads(&records, &["STANDARD".to_string()]);
    let dir = tempfile::tempdir().unwrap();
    let results = http_downloader().download_all(&items, dir.path());

    mock.assert();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_downloaded());
    assert_eq!(
        std::fs::read(
            dir.path()
                .join("LC08_L1TP_169019_20180101_20180104_01_T1.tar.gz")
        )
        .unwrap(),
        b"bundle"
    );
}
