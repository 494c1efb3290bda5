//! Resumable HTTP transfer.
//!
//! The partial file on disk is the only transfer state: its length is the
//! resume offset for the next attempt. A failed fetch never deletes it.
//!
//! Resume protocol:
//!
//! ```text
//! local len 0  ──GET──────────────────────▶ 200  write from 0
//! local len k  ──GET Range: bytes=k-──────▶ 206  Content-Range start == k → append
//!                                         ▶ 200  ranging unsupported → truncate, write from 0
//!                                         ▶ 416  impossible resume → truncate, retry once from 0
//! ```

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::TransferError;

const CHUNK: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// TransferState
// ---------------------------------------------------------------------------

/// What is on disk for a destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    pub destination: PathBuf,
    pub bytes_on_disk: u64,
    pub total: Option<u64>,
    pub complete: bool,
}

impl TransferState {
    /// Inspect a destination before fetching. Total is unknown until the
    /// server answers.
    pub fn inspect(destination: &Path) -> std::io::Result<Self> {
        let bytes_on_disk = match std::fs::metadata(destination) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(Self {
            destination: destination.to_path_buf(),
            bytes_on_disk,
            total: None,
            complete: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Content-Range
// ---------------------------------------------------------------------------

/// Parsed `Content-Range: bytes <start>-<end>/<total>` response header.
/// `end`/`start` are absent for the unsatisfied form `bytes */<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub span: Option<(u64, u64)>,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        let span = match span.trim() {
            "*" => None,
            s => {
                let (a, b) = s.split_once('-')?;
                let (a, b): (u64, u64) = (a.trim().parse().ok()?, b.trim().parse().ok()?);
                if b < a {
                    return None;
                }
                Some((a, b))
            }
        };
        Some(Self { span, total })
    }

    pub fn start(&self) -> Option<u64> {
        self.span.map(|(s, _)| s)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Decides which percentages are worth a log line: 1%, every 5%, and 100%,
/// each at most once.
#[derive(Debug)]
pub struct Progress {
    total: Option<u64>,
    last: Option<u8>,
}

impl Progress {
    pub fn new(total: Option<u64>) -> Self {
        Self { total, last: None }
    }

    /// Returns the percentage to report, if any, after `done` bytes.
    pub fn observe(&mut self, done: u64) -> Option<u8> {
        let total = self.total.filter(|t| *t > 0)?;
        let pct = ((done.min(total) as u128 * 100) / total as u128) as u8;
        if pct == 0 || self.last == Some(pct) {
            return None;
        }
        if pct == 1 || pct == 100 || pct % 5 == 0 {
            self.last = Some(pct);
            return Some(pct);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// TransferEngine
// ---------------------------------------------------------------------------

enum Attempt {
    Done(TransferState),
    Restart(String),
}

/// Blocking HTTP client pair: one for bulk transfers, one with a shorter
/// timeout for existence checks and small JSON lookups.
#[derive(Clone)]
pub struct TransferEngine {
    bulk: Client,
    quick: Client,
}

impl TransferEngine {
    pub fn new(transfer_timeout: Duration, check_timeout: Duration) -> Result<Self, TransferError> {
        let agent = concat!("updraft/", env!("CARGO_PKG_VERSION"));
        let bulk = Client::builder()
            .user_agent(agent)
            .connect_timeout(transfer_timeout)
            .timeout(transfer_timeout)
            .build()?;
        let quick = Client::builder()
            .user_agent(agent)
            .connect_timeout(check_timeout)
            .timeout(check_timeout)
            .build()?;
        Ok(Self { bulk, quick })
    }

    pub fn from_config(cfg: &AgentConfig) -> Result<Self, TransferError> {
        Self::new(cfg.transfer_timeout(), cfg.check_timeout())
    }

    /// HEAD `url`; true only for 200. Any error counts as unreachable.
    pub fn is_published(&self, url: &str) -> bool {
        match self.quick.head(url).send() {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!(url, error = %e, "existence check failed");
                false
            }
        }
    }

    /// GET a small JSON document with the short timeout.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransferError> {
        let resp = self.quick.get(url).send()?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(TransferError::NotFound(url.to_string())),
            s if s.is_success() => Ok(resp.json()?),
            s => Err(TransferError::Status {
                status: s.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    /// POST a JSON document with the short timeout, expecting 2xx.
    pub fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(), TransferError> {
        let resp = self.quick.post(url).json(body).send()?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransferError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            })
        }
    }

    /// Fetch `url` into `destination`, resuming from whatever is already on
    /// disk. On error the partial file stays for the next attempt.
    pub fn fetch(&self, url: &str, destination: &Path) -> Result<TransferState, TransferError> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = TransferState::inspect(destination)?;
        if state.bytes_on_disk > 0 {
            info!(url, offset = state.bytes_on_disk, "resuming download");
        }

        match self.attempt(url, destination, state.bytes_on_disk)? {
            Attempt::Done(done) => Ok(done),
            Attempt::Restart(reason) => {
                warn!(url, %reason, "cannot resume, restarting from zero");
                File::create(destination)?;
                match self.attempt(url, destination, 0)? {
                    Attempt::Done(done) => Ok(done),
                    Attempt::Restart(reason) => Err(TransferError::BadContentRange(reason)),
                }
            }
        }
    }

    fn attempt(&self, url: &str, destination: &Path, offset: u64) -> Result<Attempt, TransferError> {
        let mut request = self.bulk.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let mut resp = request.send()?;

        let (start, total) = match resp.status() {
            StatusCode::NOT_FOUND => return Err(TransferError::NotFound(url.to_string())),
            StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => {
                return Ok(Attempt::Restart(format!(
                    "range from {offset} not satisfiable"
                )));
            }
            StatusCode::PARTIAL_CONTENT => {
                let raw = resp
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let range = ContentRange::parse(&raw)
                    .ok_or_else(|| TransferError::BadContentRange(raw.clone()))?;
                if range.start() != Some(offset) {
                    return Ok(Attempt::Restart(format!(
                        "server answered '{raw}' for offset {offset}"
                    )));
                }
                (offset, range.total)
            }
            s if s.is_success() => {
                if offset > 0 {
                    info!(url, "server ignored range request, downloading from zero");
                }
                (0, resp.content_length())
            }
            s => {
                return Err(TransferError::Status {
                    status: s.as_u16(),
                    url: url.to_string(),
                })
            }
        };

        let mut file = if start == 0 {
            File::create(destination)?
        } else {
            OpenOptions::new().append(true).open(destination)?
        };

        let mut progress = Progress::new(total);
        let mut written = start;
        let mut buffer = vec![0u8; CHUNK];
        loop {
            let n = resp.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            written += n as u64;
            if let Some(percent) = progress.observe(written) {
                info!(
                    percent,
                    received = written,
                    total = total.unwrap_or(0),
                    "download progress"
                );
            }
        }
        file.sync_all()?;

        if let Some(expected) = total {
            if written != expected {
                return Err(TransferError::Incomplete {
                    received: written,
                    expected,
                });
            }
        }

        Ok(Attempt::Done(TransferState {
            destination: destination.to_path_buf(),
            bytes_on_disk: written,
            total: Some(total.unwrap_or(written)),
            complete: true,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
