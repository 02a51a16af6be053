//! Posting formatted threads.
//!
//! A [`Publisher`] accepts one segment at a time, optionally as a reply to an
//! earlier post. The outbox publisher appends every accepted segment to a
//! JSON Lines file that an external poster drains; the stdout publisher is
//! used for dry runs.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Reference to a published segment, used to chain replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef(pub String);

impl fmt::Display for PostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Posted(PostRef),
    /// The same text was already published
    Duplicate,
    Failed(String),
}

pub trait Publisher {
    fn publish(&mut self, text: &str, reply_to: Option<&PostRef>) -> Result<PublishOutcome>;
}

/// Hex SHA-256 of a segment's text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One line of the outbox file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub reference: PostRef,
    #[serde(default)]
    pub reply_to: Option<PostRef>,
    pub text: String,
    pub content_hash: String,
    pub posted_at: DateTime<Utc>,
}

/// Appends segments to a JSON Lines outbox, refusing text already present.
pub struct OutboxPublisher {
    path: PathBuf,
    seen: HashSet<String>,
}

impl OutboxPublisher {
    /// Open the outbox, loading the hashes of what it already holds.
    pub fn open(path: &Path) -> Result<Self> {
        let mut seen = HashSet::new();
        if path.exists() {
            let reader = BufReader::new(fs::File::open(path)?);
            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<OutboxEntry>(&line) {
                    Ok(entry) => {
                        seen.insert(entry.content_hash);
                    }
                    Err(e) => warn!(line = number + 1, error = %e, "unreadable outbox line"),
                }
            }
        }
        debug!(path = %path.display(), entries = seen.len(), "outbox opened");
        Ok(Self {
            path: path.to_path_buf(),
            seen,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &OutboxEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        Ok(())
    }
}

impl Publisher for OutboxPublisher {
    fn publish(&mut self, text: &str, reply_to: Option<&PostRef>) -> Result<PublishOutcome> {
        if text.trim().is_empty() {
            return Ok(PublishOutcome::Failed("empty segment".to_string()));
        }
        let hash = content_hash(text);
        if self.seen.contains(&hash) {
            info!(hash = %&hash[..16], "duplicate content, not posted");
            return Ok(PublishOutcome::Duplicate);
        }

        let entry = OutboxEntry {
            reference: PostRef(format!("outbox-{}", &hash[..16])),
            reply_to: reply_to.cloned(),
            text: text.to_string(),
            content_hash: hash.clone(),
            posted_at: Utc::now(),
        };
        self.append(&entry)?;
        self.seen.insert(hash);
        debug!(reference = %entry.reference, "segment queued");
        Ok(PublishOutcome::Posted(entry.reference))
    }
}

/// Writes segments to a writer (stdout by default) instead of posting.
pub struct StdoutPublisher<W: Write = io::Stdout> {
    out: W,
    count: usize,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StdoutPublisher<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out, count: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Publisher for StdoutPublisher<W> {
    fn publish(&mut self, text: &str, reply_to: Option<&PostRef>) -> Result<PublishOutcome> {
        self.count += 1;
        let reference = PostRef(format!("dry-run-{}", self.count));
        match reply_to {
            Some(parent) => writeln!(self.out, "--- {} (reply to {})", reference, parent)?,
            None => writeln!(self.out, "--- {}", reference)?,
        }
        writeln!(self.out, "{}", text)?;
        Ok(PublishOutcome::Posted(reference))
    }
}

/// How a thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadOutcome {
    /// Every segment was published
    Posted { segments: usize, head: PostRef },
    /// Stopped at a segment already published
    Duplicate { segments: usize },
    Failed { segments: usize, reason: String },
}

impl ThreadOutcome {
    /// Whether the run may record the item as posted
    pub fn is_success(&self) -> bool {
        !matches!(self, ThreadOutcome::Failed { .. })
    }
}

/// Publish `segments` in order, each replying to the previous one.
///
/// A duplicate stops the thread without error; a failure (reported or
/// raised) aborts it.
pub fn publish_thread<P: Publisher + ?Sized>(publisher: &mut P, segments: &[String]) -> ThreadOutcome {
    let mut head: Option<PostRef> = None;
    let mut previous: Option<PostRef> = None;

    for (index, segment) in segments.iter().enumerate() {
        match publisher.publish(segment, previous.as_ref()) {
            Ok(PublishOutcome::Posted(reference)) => {
                head.get_or_insert_with(|| reference.clone());
                previous = Some(reference);
            }
            Ok(PublishOutcome::Duplicate) => {
                info!(segment = index + 1, "thread stopped at duplicate segment");
                return ThreadOutcome::Duplicate { segments: index };
            }
            Ok(PublishOutcome::Failed(reason)) => {
                warn!(segment = index + 1, reason = %reason, "publisher rejected segment");
                return ThreadOutcome::Failed { segments: index, reason };
            }
            Err(e) => {
                warn!(segment = index + 1, error = %e, "publishing failed");
                return ThreadOutcome::Failed {
                    segments: index,
                    reason: e.to_string(),
                };
            }
        }
    }

    match head {
        Some(head) => ThreadOutcome::Posted {
            segments: segments.len(),
            head,
        },
        None => ThreadOutcome::Failed {
            segments: 0,
            reason: "nothing to publish".to_string(),
        },
    }
}
