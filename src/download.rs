//! Parallel bulk downloader.
//!
//! A fixed pool of worker threads drains a shared queue of
//! [`DownloadItem`]s. Each transfer streams into a hidden lock file
//! (`.<name>_lock`) next to its target and is renamed to `<name>` only once the
//! body has been fully written, so the final name never refers to a partial
//! file. Failures are logged and reported per item; nothing is retried and a
//! failed transfer leaves its lock file behind. An item whose file name
//! repeats an earlier one is reported failed without being fetched.

use anyhow::{Context, Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use crate::config::Settings;

/// Default size of the worker pool.
pub const MAX_DOWNLOADS: usize = 10;

const TMP_PREFIX: &str = ".";
const TMP_SUFFIX: &str = "_lock";

/// One unit of download work: where to fetch from and the file name to
/// publish it under, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub url: String,
    pub file_name: String,
}

impl DownloadItem {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file_name: file_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Downloaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub status: DownloadStatus,
    pub url: String,
    pub file_name: String,
}

impl DownloadResult {
    fn new(status: DownloadStatus, item: &DownloadItem) -> Self {
        Self {
            status,
            url: item.url.clone(),
            file_name: item.file_name.clone(),
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.status == DownloadStatus::Downloaded
    }
}

/// Name of the temporary file a transfer is written to.
pub fn lock_file_name(file_name: &str) -> String {
    format!("{}{}{}", TMP_PREFIX, file_name, TMP_SUFFIX)
}

/// An open response body.
pub struct Body {
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

/// Opens a streaming GET. Implementations must fail on non-2xx responses.
pub trait Fetch: Sync {
    fn open(&self, url: &str) -> Result<Body>;
}

/// [`Fetch`] over a blocking `reqwest` client. Download URLs are pre-signed,
/// so no credentials are attached.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: HttpClient,
}

impl HttpFetcher {
    /// Connect timeout of 30 s, no limit on the total transfer time.
    pub fn new(verify: bool) -> Result<Self> {
        Self::with_timeouts(verify, Duration::from_secs(30), None)
    }

    /// Uses `settings.download_timeout` as the limit on a whole transfer.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::with_timeouts(
            settings.verify,
            Duration::from_secs(30),
            settings.download_timeout,
        )
    }

    pub fn with_timeouts(
        verify: bool,
        connect_timeout: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = HttpClient::builder()
            .user_agent(format!("usgs-api-rs/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(timeout);
        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build().context("failed to build HTTP client")?;
        Ok(Self { http })
    }
}

impl Fetch for HttpFetcher {
    fn open(&self, url: &str) -> Result<Body> {
        let resp = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("error while trying to open {}", url))?
            .error_for_status()
            .with_context(|| format!("server responded with an HTTP error for {}", url))?;

        Ok(Body {
            content_length: resp.content_length(),
            reader: Box::new(resp),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Downloader<F = HttpFetcher> {
    fetcher: F,
    max_workers: usize,
    progress: bool,
}

impl<F: Fetch> Downloader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            max_workers: MAX_DOWNLOADS,
            progress: false,
        }
    }

    /// Upper bound on concurrent transfers (at least 1).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Draw progress bars on stderr.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Downloads every item into `out_dir` and returns one result per item,
    /// in input order. Never fails as a whole: per-item errors are logged and
    /// reported as [`DownloadStatus::Failed`].
    pub fn download_all(&self, items: &[DownloadItem], out_dir: &Path) -> Vec<DownloadResult> {
        if items.is_empty() {
            return Vec::new();
        }

        // One write-once slot per item; only the worker that dequeued index i writes slot i.
        let slots: Vec<OnceLock<DownloadResult>> = items.iter().map(|_| OnceLock::new()).collect();

        // Two transfers must never share a lock file: later repeats of a name fail up front.
        let mut names = HashSet::with_capacity(items.len());
        let mut pending = VecDeque::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if names.insert(item.file_name.as_str()) {
                pending.push_back((index, item));
            } else {
                tracing::warn!(url = %item.url, file = %item.file_name, "output file name already used by an earlier item, skipping");
                let _ = slots[index].set(DownloadResult::new(DownloadStatus::Failed, item));
            }
        }

        let workers = self.max_workers.min(pending.len());
        tracing::debug!(workers, items = items.len(), "number of parallel downloads set");

        let progress = self.progress.then(|| Progress::new(pending.len() as u64));
        let queue: Mutex<VecDeque<(usize, &DownloadItem)>> = Mutex::new(pending);

        thread::scope(|s| {
            for id in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("download-{}", id))
                    .spawn_scoped(s, || self.work(&queue, &slots, out_dir, progress.as_ref()));
                if let Err(e) = spawned {
                    tracing::error!(error = %e, "failed to start download worker {}", id);
                }
            }
        });

        // Only non-empty if a worker could not be started.
        self.work(&queue, &slots, out_dir, progress.as_ref());

        if let Some(p) = &progress {
            p.finish();
        }

        let results: Vec<DownloadResult> = slots
            .into_iter()
            .zip(items)
            .map(|(slot, item)| {
                slot.into_inner()
                    .unwrap_or_else(|| DownloadResult::new(DownloadStatus::Failed, item))
            })
            .collect();

        let ok = results.iter().filter(|r| r.is_downloaded()).count();
        tracing::info!(downloaded = ok, failed = results.len() - ok, "all downloads processed");
        results
    }

    fn work(
        &self,
        queue: &Mutex<VecDeque<(usize, &DownloadItem)>>,
        slots: &[OnceLock<DownloadResult>],
        out_dir: &Path,
        progress: Option<&Progress>,
    ) {
        loop {
            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some((index, item)) = next else {
                break;
            };

            tracing::info!(url = %item.url, dir = %out_dir.display(), file = %item.file_name, "trying to download");
            let status = match self.download_one(item, out_dir, progress) {
                Ok(path) => {
                    tracing::debug!(path = %path.display(), "download complete");
                    DownloadStatus::Downloaded
                }
                Err(e) => {
                    tracing::warn!(url = %item.url, error = %format!("{:#}", e), "download failed");
                    DownloadStatus::Failed
                }
            };

            if slots[index].set(DownloadResult::new(status, item)).is_err() {
                tracing::error!(index, "download result written twice");
            }
            if let Some(p) = progress {
                p.item_done();
            }
        }
    }

    /// Streams one item to `<out_dir>/.<name>_lock`, then renames it to
    /// `<out_dir>/<name>`. Returns the final path.
    pub fn download_one(
        &self,
        item: &DownloadItem,
        out_dir: &Path,
        progress: Option<&Progress>,
    ) -> Result<PathBuf> {
        check_file_name(&item.file_name)?;
        let tmp_path = out_dir.join(lock_file_name(&item.file_name));
        let final_path = out_dir.join(&item.file_name);

        let mut body = self.fetcher.open(&item.url)?;
        tracing::debug!(url = %item.url, "opened download stream");

        let file = File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        tracing::debug!(path = %tmp_path.display(), "writing to temp file");
        let mut out = BufWriter::with_capacity(64 * 1024, file);

        let bar = progress.map(|p| p.transfer(&item.file_name, body.content_length));
        let copied = match &bar {
            Some(bar) => std::io::copy(&mut body.reader, &mut bar.wrap_write(&mut out)),
            None => std::io::copy(&mut body.reader, &mut out),
        };
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        let written = copied.with_context(|| format!("download interrupted: {}", item.url))?;

        let file = out
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        drop(file);

        if let Some(expected) = body.content_length {
            if written != expected {
                bail!(
                    "download incomplete: received {} byte(s) out of {} for {}",
                    written,
                    expected,
                    item.url
                );
            }
        }

        tracing::debug!(from = %tmp_path.display(), to = %final_path.display(), "renaming temp file");
        std::fs::rename(&tmp_path, &final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp_path.display(),
                final_path.display()
            )
        })?;
        Ok(final_path)
    }
}

impl Downloader<HttpFetcher> {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(HttpFetcher::from_settings(settings)?))
    }
}

fn check_file_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || Path::new(name).is_absolute()
    {
        bail!("invalid output file name [{}]", name);
    }
    Ok(())
}

/// Progress display: an item counter plus one byte bar per active transfer.
pub struct Progress {
    multi: MultiProgress,
    items: ProgressBar,
}

impl Progress {
    fn new(total: u64) -> Self {
        let multi = MultiProgress::new();
        let items = multi.add(ProgressBar::new(total));
        items.set_style(
            ProgressStyle::with_template("{prefix:.bold} {pos}/{len} {wide_bar} {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        items.set_prefix("files");
        Self { multi, items }
    }

    fn transfer(&self, name: &str, len: Option<u64>) -> ProgressBar {
        let bar = match len {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} {msg} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(name.to_string());
        self.multi.add(bar)
    }

    fn item_done(&self) {
        self.items.inc(1);
    }

    fn finish(&self) {
        self.items.finish_and_clear();
    }
}
