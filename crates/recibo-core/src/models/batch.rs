//! Batch input and result types.

use serde::Serialize;

use super::invoice::InvoiceRecord;
use crate::error::FileError;

/// A PDF submitted for processing.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// User-supplied filename, carried into the record and output naming.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Ordered set of files processed together.
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    pub files: Vec<UploadFile>,
}

impl UploadBatch {
    pub fn new(files: Vec<UploadFile>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Pipeline stage of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "reason", rename_all = "snake_case")]
pub enum FileStage {
    Pending,
    Extracting,
    Structuring,
    Normalizing,
    Done,
    Failed(String),
}

impl FileStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Outcome for one input file.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub filename: String,
    pub outcome: Result<InvoiceRecord, FileError>,
}

impl BatchEntry {
    pub fn record(&self) -> Option<&InvoiceRecord> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FileError> {
        self.outcome.as_ref().err()
    }
}

/// Per-file results of a batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,

    /// The batch was cancelled before every file finished.
    pub cancelled: bool,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &InvoiceRecord> {
        self.entries.iter().filter_map(BatchEntry::record)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FileError)> {
        self.entries
            .iter()
            .filter_map(|e| e.error().map(|err| (e.filename.as_str(), err)))
    }

    pub fn summary(&self) -> BatchSummary {
        let failed: Vec<FailedFile> = self
            .failures()
            .map(|(filename, err)| FailedFile {
                filename: filename.to_string(),
                reason: err.to_string(),
            })
            .collect();

        BatchSummary {
            total: self.entries.len(),
            succeeded: self.entries.len() - failed.len(),
            with_warnings: self.records().filter(|r| !r.warnings.is_empty()).count(),
            failed,
            cancelled: self.cancelled,
        }
    }
}

/// A file that produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub filename: String,
    pub reason: String,
}

/// Counts reported at the end of every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Succeeded records that carry at least one warning.
    pub with_warnings: usize,
    pub failed: Vec<FailedFile>,
    pub cancelled: bool,
}
