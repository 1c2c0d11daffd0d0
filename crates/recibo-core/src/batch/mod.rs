//! Batch orchestration: drives every file through extraction, structuring and
//! normalization with bounded concurrency.

mod progress;

pub use progress::{BatchProgress, CancelSignal, ProgressTracker};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{BatchError, ExtractionError, FileError};
use crate::extraction::DocumentExtractor;
use crate::models::batch::{BatchEntry, BatchResult, FileStage, UploadBatch, UploadFile};
use crate::models::config::PipelineConfig;
use crate::models::invoice::{CandidateInvoice, InvoiceRecord};
use crate::normalize::Normalizer;
use crate::pdf::validate_pdf;
use crate::retry::RetryPolicy;
use crate::structuring::FieldStructurer;

/// Shared per-file pipeline. One instance serves every worker of a batch.
struct FilePipeline {
    extractor: Arc<dyn DocumentExtractor>,
    structurer: Arc<dyn FieldStructurer>,
    normalizer: Normalizer,
    retry: RetryPolicy,
    ocr_timeout: Duration,
    llm_timeout: Duration,
    min_text_chars: usize,
    max_pdf_bytes: usize,
    progress: ProgressTracker,
}

impl FilePipeline {
    async fn process(&self, index: usize, file: UploadFile) -> Result<InvoiceRecord, FileError> {
        let filename = file.filename.as_str();

        self.progress.set_stage(index, FileStage::Extracting);
        validate_pdf(&file.bytes, self.max_pdf_bytes)?;

        let extractor = &*self.extractor;
        let pdf = file.bytes.as_slice();
        let text = self
            .retry
            .run("extraction", self.ocr_timeout, move || extractor.extract(filename, pdf))
            .await?;

        let chars = text.trim().chars().count();
        if chars < self.min_text_chars {
            return Err(ExtractionError::Permanent(format!(
                "no readable text ({} characters extracted)",
                chars
            ))
            .into());
        }

        self.progress.set_stage(index, FileStage::Structuring);
        let structurer = &*self.structurer;
        let text = text.as_str();
        let fields = self
            .retry
            .run("structuring", self.llm_timeout, move || structurer.structure(text))
            .await?;

        self.progress.set_stage(index, FileStage::Normalizing);
        let candidate = CandidateInvoice::new(filename, fields);
        Ok(self.normalizer.normalize(&candidate))
    }
}

/// Runs batches of invoices through the pipeline.
pub struct BatchOrchestrator {
    pipeline: Arc<FilePipeline>,
    max_files: usize,
    concurrency: usize,
    progress: ProgressTracker,
}

impl BatchOrchestrator {
    pub fn new(
        config: &PipelineConfig,
        extractor: Arc<dyn DocumentExtractor>,
        structurer: Arc<dyn FieldStructurer>,
    ) -> Self {
        let progress = ProgressTracker::new();

        let pipeline = FilePipeline {
            extractor,
            structurer,
            normalizer: Normalizer::new(config.normalization.clone()),
            retry: RetryPolicy::from(&config.retry),
            ocr_timeout: config.ocr.timeout(),
            llm_timeout: config.llm.timeout(),
            min_text_chars: config.ocr.min_text_chars,
            max_pdf_bytes: config.batch.max_pdf_bytes,
            progress: progress.clone(),
        };

        Self {
            pipeline: Arc::new(pipeline),
            max_files: config.batch.max_files,
            concurrency: config.batch.concurrency(),
            progress,
        }
    }

    /// Progress of the current (or last) batch.
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Process every file of `batch`.
    ///
    /// The result has exactly one entry per input file, in input order. A failing
    /// file never stops the others. On cancellation, files that already finished
    /// keep their results and the rest are reported as cancelled.
    pub async fn run(
        &self,
        batch: UploadBatch,
        cancel: &CancelSignal,
    ) -> Result<BatchResult, BatchError> {
        let total = batch.len();
        if total > self.max_files {
            return Err(BatchError::TooManyFiles {
                count: total,
                max: self.max_files,
            });
        }

        let start = Instant::now();
        self.progress.reset(total);
        info!(files = total, concurrency = self.concurrency, "Starting batch");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut filenames = Vec::with_capacity(total);

        for (index, file) in batch.files.into_iter().enumerate() {
            filenames.push(file.filename.clone());

            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let span = info_span!("file", name = %file.filename);

            tasks.spawn(
                async move {
                    let work = async {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| FileError::Aborted(e.to_string()))?;
                        pipeline.process(index, file).await
                    };

                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(FileError::Cancelled),
                        outcome = work => outcome,
                    };
                    (index, outcome)
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<Result<InvoiceRecord, FileError>>> =
            (0..total).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    match &outcome {
                        Ok(record) => {
                            info!(
                                file = %filenames[index],
                                warnings = record.warnings.len(),
                                "Processed"
                            );
                            self.progress.set_stage(index, FileStage::Done);
                        }
                        Err(FileError::Cancelled) => {
                            self.progress
                                .set_stage(index, FileStage::Failed(FileError::Cancelled.to_string()));
                        }
                        Err(e) => {
                            warn!(file = %filenames[index], "Failed: {}", e);
                            self.progress.set_stage(index, FileStage::Failed(e.to_string()));
                        }
                    }
                    slots[index] = Some(outcome);
                }
                Err(e) => error!("Batch worker stopped: {}", e),
            }
        }

        let entries: Vec<BatchEntry> = filenames
            .into_iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (filename, slot))| {
                let outcome = slot.unwrap_or_else(|| {
                    let err = FileError::Aborted("worker stopped before reporting".to_string());
                    self.progress.set_stage(index, FileStage::Failed(err.to_string()));
                    Err(err)
                });
                BatchEntry { filename, outcome }
            })
            .collect();

        let cancelled = entries
            .iter()
            .any(|e| matches!(e.outcome, Err(FileError::Cancelled)));

        let result = BatchResult { entries, cancelled };
        let summary = result.summary();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            cancelled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch finished"
        );

        Ok(result)
    }
}
