use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::types::{LogEntry, Sequence};
use crate::error::{ClusterError, Result};
use crate::store::{StoreError, TableStore};

struct LogFiles {
    log: File,
    cursor_path: PathBuf,
}

/// Ordered log of one shard on one replica, with its replay cursor.
///
/// The full log is kept in memory as well as on disk: snapshots ship the
/// complete log, and election only needs its length.
pub struct WriteAheadLog {
    shard: String,
    entries: Vec<LogEntry>,
    applied: usize,
    last_sequence: Sequence,
    rejections: BTreeMap<usize, StoreError>,
    files: Option<LogFiles>,
}

const MAX_UNCLAIMED_REJECTIONS: usize = 1024;

/// Outcome of one replay pass.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Entries applied (or rejected) during this pass.
    pub applied: usize,
    /// 1-based log index and storage error of each entry storage refused.
    pub rejected: Vec<(usize, StoreError)>,
}

impl ReplayReport {
    pub fn rejection_for(&self, index: usize) -> Option<&StoreError> {
        self.rejected
            .iter()
            .find(|(rejected, _)| *rejected == index)
            .map(|(_, err)| err)
    }
}

impl WriteAheadLog {
    /// A log with no backing files. Used by replicas started without a data
    /// directory.
    pub fn in_memory(shard: &str) -> Self {
        Self {
            shard: shard.to_string(),
            entries: Vec::new(),
            applied: 0,
            last_sequence: 0,
            rejections: BTreeMap::new(),
            files: None,
        }
    }

    /// Opens the shard's log in `dir`, recovering entries and cursor from a
    /// previous run if the files exist.
    pub async fn open(dir: &Path, shard: &str) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        let log_path = dir.join(format!("{}.log", shard));
        let cursor_path = dir.join(format!("{}.idx", shard));

        let entries = match fs::read_to_string(&log_path).await {
            Ok(text) => parse_entries(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let applied = match fs::read_to_string(&cursor_path).await {
            Ok(text) => text
                .trim()
                .parse::<usize>()
                .map_err(|e| ClusterError::CorruptCursor {
                    shard: shard.to_string(),
                    reason: format!("{:?}: {}", text.trim(), e),
                })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;

        let last_sequence = entries
            .iter()
            .filter_map(|entry| entry.sequence)
            .max()
            .unwrap_or(0);
        let applied = applied.min(entries.len());

        tracing::info!(
            "Opened log for shard {} ({} entries, {} applied)",
            shard,
            entries.len(),
            applied
        );

        Ok(Self {
            shard: shard.to_string(),
            entries,
            applied,
            last_sequence,
            rejections: BTreeMap::new(),
            files: Some(LogFiles { log, cursor_path }),
        })
    }

    /// Opens the shard's log in `dir` after discarding anything already there.
    pub async fn create(dir: &Path, shard: &str) -> Result<Self> {
        for name in [format!("{}.log", shard), format!("{}.idx", shard)] {
            match fs::remove_file(dir.join(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Self::open(dir, shard).await
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// Commit index: number of entries ever appended.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay cursor: number of entries applied to storage.
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn pending(&self) -> usize {
        self.entries.len() - self.applied
    }

    pub fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// True if a mutation carrying `sequence` has already been appended.
    pub fn is_duplicate(&self, sequence: Option<Sequence>) -> bool {
        matches!(sequence, Some(seq) if seq <= self.last_sequence)
    }

    /// Durably appends one entry and returns its 1-based index.
    pub async fn append(&mut self, entry: LogEntry) -> Result<usize> {
        self.append_batch(vec![entry]).await
    }

    /// Durably appends entries in order and returns the new commit index.
    pub async fn append_batch(&mut self, batch: Vec<LogEntry>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(self.entries.len());
        }

        if let Some(files) = self.files.as_mut() {
            let mut buf = Vec::new();
            for entry in &batch {
                serde_json::to_writer(&mut buf, entry).map_err(std::io::Error::other)?;
                buf.push(b'\n');
            }
            files.log.write_all(&buf).await?;
            files.log.sync_data().await?;
        }

        for entry in batch {
            if let Some(seq) = entry.sequence {
                self.last_sequence = self.last_sequence.max(seq);
            }
            self.entries.push(entry);
        }

        Ok(self.entries.len())
    }

    /// Moves the replay cursor, e.g. after installing a snapshot whose rows
    /// already reflect the first `cursor` entries.
    pub async fn set_applied(&mut self, cursor: usize) -> Result<()> {
        self.applied = cursor.min(self.entries.len());
        self.persist_cursor().await
    }

    /// Applies every pending entry to `store`, in log order, persisting the
    /// cursor after each one.
    ///
    /// An entry the storage engine refuses is recorded in the report and
    /// skipped, so a single bad mutation cannot wedge the log.
    pub async fn replay(&mut self, store: &dyn TableStore) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();

        while self.applied < self.entries.len() {
            let entry = &self.entries[self.applied];
            if let Err(e) = entry.operation.apply(store, &self.shard).await {
                tracing::warn!(
                    "Shard {}: storage rejected {} at log index {}: {}",
                    self.shard,
                    entry.operation.kind(),
                    self.applied + 1,
                    e
                );
                if self.rejections.len() >= MAX_UNCLAIMED_REJECTIONS {
                    self.rejections.clear();
                }
                self.rejections.insert(self.applied + 1, e.clone());
                report.rejected.push((self.applied + 1, e));
            }
            self.applied += 1;
            report.applied += 1;
            self.persist_cursor().await?;
        }

        if report.applied > 0 {
            tracing::debug!(
                "Shard {}: replayed {} entries (cursor {})",
                self.shard,
                report.applied,
                self.applied
            );
        }

        Ok(report)
    }

    /// Storage error of the entry at `index`, if replay rejected it. Each
    /// rejection is handed out once, to whichever request claims it.
    pub fn take_rejection(&mut self, index: usize) -> Option<StoreError> {
        self.rejections.remove(&index)
    }

    async fn persist_cursor(&self) -> Result<()> {
        let Some(files) = self.files.as_ref() else {
            return Ok(());
        };
        let tmp = files.cursor_path.with_extension("idx.tmp");
        let mut file = File::create(&tmp).await?;
        file.write_all(self.applied.to_string().as_bytes()).await?;
        file.sync_data().await?;
        fs::rename(&tmp, &files.cursor_path).await?;
        Ok(())
    }
}

fn parse_entries(text: &str) -> Result<Vec<LogEntry>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| ClusterError::CorruptLog {
                index: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}
