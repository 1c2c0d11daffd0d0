//! Core library for Panamanian electricity invoice extraction.
//!
//! This crate provides:
//! - PDF validation before anything is sent to a remote service
//! - Text extraction through the LLMWhisperer OCR service
//! - Field structuring through an OpenAI-compatible chat model
//! - Normalization into a fixed, typed invoice schema (amounts, dates, NIS, sector)
//! - Batch orchestration with bounded concurrency, retries, progress and cancellation
//! - Consolidated and per-invoice xlsx export

pub mod batch;
pub mod error;
pub mod export;
pub mod extraction;
pub mod models;
pub mod normalize;
pub mod pdf;
pub mod retry;
pub mod structuring;

pub use batch::{BatchOrchestrator, BatchProgress, CancelSignal, ProgressTracker};
pub use error::{
    BatchError, ConfigError, ExportError, ExtractionError, FileError, ReciboError, Result,
    StructuringError,
};
pub use export::{export, write_exports, ExportMode, ExportTable};
pub use extraction::{DocumentExtractor, WhispererClient};
pub use models::batch::{BatchEntry, BatchResult, BatchSummary, FileStage, UploadBatch, UploadFile};
pub use models::config::{Credentials, ExportSelection, PipelineConfig};
pub use models::invoice::{
    CandidateInvoice, FieldValue, InvoiceField, InvoiceRecord, NormalizationWarning, Provenance,
};
pub use normalize::{KeyResolver, Normalizer};
pub use retry::RetryPolicy;
pub use structuring::{FieldStructurer, OpenAiStructurer};
