//! Local JSONL backup of finalized entries
//!
//! Every appended entry is offered to a background writer that appends it as
//! one JSON line to a local file. The offer is a non-blocking `try_send`:
//! the append path never waits on disk, and a wedged or missing backup file
//! can only ever lose backup lines, never transcripts.

use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::registry::TranscriptEntry;

/// Queue depth between the append path and the disk writer
const BACKUP_QUEUE_DEPTH: usize = 1024;

/// Handle for offering entries to the backup task
///
/// Cheap to clone; a disabled writer accepts offers and discards them.
#[derive(Clone)]
pub struct BackupWriter {
    tx: Option<mpsc::Sender<TranscriptEntry>>,
}

impl BackupWriter {
    /// Writer that discards every offer
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Spawn the appender task writing JSON lines to `path`
    ///
    /// The file is created if missing and appended to otherwise. Open errors
    /// are reported once and turn the writer into a sink.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(BACKUP_QUEUE_DEPTH);
        tokio::spawn(run_appender(path, rx));
        Self { tx: Some(tx) }
    }

    /// Whether offers can reach a disk writer
    pub fn enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Offer one entry to the backup file
    ///
    /// Never blocks. If the queue is full or the writer is gone the entry is
    /// dropped from the backup only; the in-memory log already has it.
    pub fn offer(&self, entry: &TranscriptEntry) {
        if let Some(tx) = &self.tx {
            if tx.try_send(entry.clone()).is_err() {
                tracing::debug!(room = %entry.room, sequence = entry.sequence, "Backup queue unavailable, line dropped");
            }
        }
    }
}

async fn run_appender(path: PathBuf, mut rx: mpsc::Receiver<TranscriptEntry>) {
    let mut file = match OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(file) => {
            tracing::info!(path = %path.display(), "Backup file opened");
            file
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Backup file could not be opened, backup disabled");
            return;
        }
    };

    while let Some(entry) = rx.recv().await {
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Backup line could not be encoded");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = file.write_all(&line).await {
            tracing::warn!(path = %path.display(), error = %e, "Backup write failed");
        }
    }

    let _ = file.flush().await;
    tracing::debug!(path = %path.display(), "Backup writer stopped");
}

#[cfg(test)]
mod tests {
    use crate::registry::SourceType;

    use super::*;

    #[tokio::test]
    async fn test_entries_land_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.jsonl");

        let writer = BackupWriter::spawn(path.clone());
        assert!(writer.enabled());

        writer.offer(&TranscriptEntry::new("Hall A", "Welcome", 1000.0, SourceType::Agent, 0));
        writer.offer(&TranscriptEntry::new("Hall A", "to the tour", 1005.0, SourceType::Agent, 1));

        // Close the queue and give the writer a moment to drain
        drop(writer);
        let mut contents = String::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if contents.lines().count() == 2 {
                break;
            }
        }

        let lines: Vec<TranscriptEntry> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Welcome");
        assert_eq!(lines[1].sequence, 1);
    }

    #[tokio::test]
    async fn test_disabled_writer_discards_quietly() {
        let writer = BackupWriter::disabled();
        assert!(!writer.enabled());
        writer.offer(&TranscriptEntry::new("Hall A", "Welcome", 1000.0, SourceType::Agent, 0));
    }

    #[tokio::test]
    async fn test_unopenable_path_does_not_block_offers() {
        let writer = BackupWriter::spawn(PathBuf::from("/nonexistent-dir/backup.jsonl"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The appender has already given up; offers go nowhere but never block
        for i in 0..10 {
            writer.offer(&TranscriptEntry::new("A", "line", i as f64, SourceType::Agent, i));
        }
    }
}
