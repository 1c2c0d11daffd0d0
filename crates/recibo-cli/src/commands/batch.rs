//! Batch processing command for a folder or glob of invoice PDFs.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use recibo_core::models::batch::{BatchResult, UploadBatch, UploadFile};
use recibo_core::models::invoice::InvoiceField;
use recibo_core::{write_exports, CancelSignal, ExportSelection};

use super::{build_orchestrator, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Directory of PDFs or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory for the workbooks
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Which workbooks to write
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Also write summary.csv to the output directory, or to the current
    /// directory when the output directory is unusable
    #[arg(long)]
    summary: bool,

    /// Number of files processed concurrently
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ModeArg {
    /// One sheet with every invoice
    Consolidated,
    /// One sheet per invoice
    Individual,
    /// Both workbooks
    Both,
}

impl From<ModeArg> for ExportSelection {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Consolidated => Self::Consolidated,
            ModeArg::Individual => Self::Individual,
            ModeArg::Both => Self::Both,
        }
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(jobs) = args.jobs {
        config.batch.max_concurrency = jobs;
    }
    if let Some(mode) = args.mode {
        config.export.mode = mode.into();
    }
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.export.output_dir.clone());

    let files = collect_inputs(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No PDF files found for: {}", args.input);
    }
    if files.len() > config.batch.max_files {
        anyhow::bail!(
            "Found {} files, the maximum per batch is {}",
            files.len(),
            config.batch.max_files
        );
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let mut uploads = Vec::with_capacity(files.len());
    for path in &files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        uploads.push(UploadFile::new(filename, fs::read(path)?));
    }

    let orchestrator = build_orchestrator(&config)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let mut updates = orchestrator.progress().subscribe();
    let watcher = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let progress = updates.borrow_and_update().clone();
                pb.set_position(progress.processed as u64);
                pb.set_message(format!("({} failed)", progress.failed));
            }
        })
    };

    let cancel = CancelSignal::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling remaining files");
                cancel.cancel();
            }
        })
    };

    let result = orchestrator.run(UploadBatch::new(uploads), &cancel).await?;
    interrupt.abort();
    watcher.abort();
    pb.finish_with_message("Complete");

    let summary_dirs: Vec<&Path> = if args.summary {
        vec![output_dir.as_path(), Path::new(".")]
    } else {
        Vec::new()
    };
    let written = report(
        &result,
        config.export.mode,
        &output_dir,
        &summary_dirs,
        start.elapsed(),
    );

    if !written {
        anyhow::bail!("Some batch outputs could not be written");
    }
    Ok(())
}

/// Write the workbooks and the optional summary CSV, then print counts and
/// failed files. A failed write is reported and does not stop the rest.
///
/// The summary goes to the first of `summary_dirs` that accepts it; an empty
/// slice skips it. Returns false when any output could not be written.
fn report(
    result: &BatchResult,
    selection: ExportSelection,
    output_dir: &Path,
    summary_dirs: &[&Path],
    elapsed: Duration,
) -> bool {
    let summary = result.summary();
    let mut written = true;

    if summary.succeeded > 0 {
        match write_exports(result, selection, output_dir) {
            Ok(paths) => {
                for path in paths {
                    println!("{} Workbook written to {}", style("✓").green(), path.display());
                }
            }
            Err(e) => {
                eprintln!("{} Export failed: {}", style("✗").red(), e);
                written = false;
            }
        }
    } else {
        println!("{} No invoices to export", style("ℹ").blue());
    }

    if !summary_dirs.is_empty() {
        match write_summary_to_first(summary_dirs, result) {
            Ok(path) => println!("{} Summary written to {}", style("✓").green(), path.display()),
            Err(e) => {
                eprintln!("{} Summary not written: {}", style("✗").red(), e);
                written = false;
            }
        }
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        summary.total,
        elapsed
    );
    println!(
        "   {} successful ({} with warnings), {} failed",
        style(summary.succeeded).green(),
        style(summary.with_warnings).yellow(),
        style(summary.failed.len()).red()
    );

    if summary.cancelled {
        println!("{}", style("Batch was cancelled before every file finished.").yellow());
    }

    if !summary.failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for failed in &summary.failed {
            println!("  - {}: {}", failed.filename, failed.reason);
        }
    }

    written
}

fn write_summary_to_first(dirs: &[&Path], result: &BatchResult) -> anyhow::Result<PathBuf> {
    let mut last_error = None;
    for dir in dirs {
        let path = dir.join("summary.csv");
        match fs::create_dir_all(dir)
            .map_err(anyhow::Error::from)
            .and_then(|()| write_summary(&path, result))
        {
            Ok(()) => return Ok(path),
            Err(e) => {
                warn!("Cannot write summary to {}: {}", dir.display(), e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no summary location")))
}

/// PDFs named by `input`: every `*.pdf` / `*.PDF` of a directory, or the PDF
/// matches of a glob pattern. Sorted, without duplicates.
fn collect_inputs(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let dir = Path::new(input);
    let patterns = if dir.is_dir() {
        vec![
            dir.join("*.pdf").to_string_lossy().into_owned(),
            dir.join("*.PDF").to_string_lossy().into_owned(),
        ]
    } else {
        vec![input.to_string()]
    };

    let mut files = BTreeSet::new();
    for pattern in &patterns {
        for path in glob(pattern)?.filter_map(|r| r.ok()) {
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if is_pdf && path.is_file() {
                files.insert(path);
            }
        }
    }

    debug!("Matched {} files", files.len());
    Ok(files.into_iter().collect())
}

fn write_summary(path: &Path, result: &BatchResult) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "nis",
        "sector",
        "consumo_kwh",
        "total_mes",
        "gran_total",
        "fields_extracted",
        "warnings",
        "error",
    ])?;

    for entry in &result.entries {
        match &entry.outcome {
            Ok(record) => {
                let value = |field: InvoiceField| {
                    record.get(field).map(|v| v.to_string()).unwrap_or_default()
                };
                let warnings = record
                    .warnings
                    .iter()
                    .map(|w| w.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                let status = if record.warnings.is_empty() {
                    "success"
                } else {
                    "warning"
                };

                wtr.write_record([
                    entry.filename.as_str(),
                    status,
                    &value(InvoiceField::Nis),
                    &value(InvoiceField::Sector),
                    &value(InvoiceField::ConsumptionKwh),
                    &value(InvoiceField::MonthTotal),
                    &value(InvoiceField::AmountDue),
                    &record.filled_count().to_string(),
                    &warnings,
                    "",
                ])?;
            }
            Err(e) => {
                wtr.write_record([
                    entry.filename.as_str(),
                    "error",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    &e.to_string(),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recibo_core::models::invoice::{FieldValue, InvoiceRecord, Provenance};
    use recibo_core::{BatchEntry, ExtractionError, FileError};

    fn sample_result() -> BatchResult {
        let mut record = InvoiceRecord::new("enero.pdf");
        record.set(
            InvoiceField::Nis,
            FieldValue::Text("6012355002".to_string()),
            Provenance::Extracted,
        );
        BatchResult {
            entries: vec![
                BatchEntry {
                    filename: "enero.pdf".to_string(),
                    outcome: Ok(record),
                },
                BatchEntry {
                    filename: "roto.pdf".to_string(),
                    outcome: Err(FileError::Extraction(ExtractionError::Permanent(
                        "not a PDF".to_string(),
                    ))),
                },
            ],
            cancelled: false,
        }
    }

    #[test]
    fn test_report_writes_summary_when_export_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("salida");
        fs::write(&blocked, b"not a directory").unwrap();

        let written = report(
            &sample_result(),
            ExportSelection::Consolidated,
            &blocked,
            &[blocked.as_path(), dir.path()],
            Duration::ZERO,
        );

        assert!(!written);
        let csv = fs::read_to_string(dir.path().join("summary.csv")).unwrap();
        assert!(csv.contains("enero.pdf,success,6012355002"));
        assert!(csv.contains("roto.pdf,error"));
    }

    #[test]
    fn test_report_writes_workbook_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("salida");

        let written = report(
            &sample_result(),
            ExportSelection::Consolidated,
            &out,
            &[out.as_path()],
            Duration::ZERO,
        );

        assert!(written);
        assert!(out.join("summary.csv").exists());
        let workbooks = fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "xlsx"))
            .count();
        assert_eq!(workbooks, 1);
    }

    #[test]
    fn test_collect_inputs_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pdf"), b"%PDF-").unwrap();
        fs::write(dir.path().join("a.PDF"), b"%PDF-").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = collect_inputs(&dir.path().to_string_lossy()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn test_collect_inputs_from_glob() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("enero.pdf"), b"%PDF-").unwrap();
        fs::write(dir.path().join("febrero.pdf"), b"%PDF-").unwrap();
        fs::write(dir.path().join("enero.txt"), b"x").unwrap();

        let pattern = dir.path().join("enero.*");
        let files = collect_inputs(&pattern.to_string_lossy()).unwrap();
        assert_eq!(files, vec![dir.path().join("enero.pdf")]);
    }
}
