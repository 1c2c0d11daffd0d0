//! Process command - extract data from a single invoice PDF.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use recibo_core::models::batch::{BatchResult, UploadBatch, UploadFile};
use recibo_core::models::invoice::{FieldKind, FieldValue, InvoiceField, InvoiceRecord};
use recibo_core::normalize::rules::format_amount;
use recibo_core::{CancelSignal, ExportSelection};

use super::{build_orchestrator, load_config, stage_label};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also write the individual Excel workbook to the export directory
    #[arg(long)]
    xlsx: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());
    let bytes = fs::read(&args.input)?;

    info!("Processing file: {}", args.input.display());
    let orchestrator = build_orchestrator(&config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut updates = orchestrator.progress().subscribe();
    let watcher = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let stage = updates.borrow_and_update().stages.first().cloned();
                if let Some(stage) = stage {
                    pb.set_message(stage_label(&stage).to_string());
                }
            }
        })
    };

    let batch = UploadBatch::new(vec![UploadFile::new(filename.clone(), bytes)]);
    let result = orchestrator.run(batch, &CancelSignal::new()).await?;
    watcher.abort();
    pb.finish_and_clear();

    let Some(entry) = result.entries.first() else {
        anyhow::bail!("No result for {}", filename);
    };
    let record = match &entry.outcome {
        Ok(record) => record,
        Err(e) => anyhow::bail!("Failed to process {}: {}", filename, e),
    };

    for warning in &record.warnings {
        eprintln!("{} {}", style("⚠").yellow(), warning);
    }

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(record)?,
        OutputFormat::Text => format_text(record),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.xlsx {
        write_workbook(&result, &config.export.output_dir)?;
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn write_workbook(result: &BatchResult, dir: &std::path::Path) -> anyhow::Result<()> {
    let paths = recibo_core::write_exports(result, ExportSelection::Individual, dir)?;
    for path in paths {
        println!("{} Workbook written to {}", style("✓").green(), path.display());
    }
    Ok(())
}

fn format_text(record: &InvoiceRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("File: {}\n\n", record.source_file));

    for field in InvoiceField::ALL {
        let value = match (field.kind(), record.get(field)) {
            (FieldKind::Amount, Some(FieldValue::Number(n))) => format_amount(*n),
            (_, Some(value)) => value.to_string(),
            (_, None) => continue,
        };
        output.push_str(&format!("  {:<32} {}\n", field.header(), value));
    }

    output.push_str(&format!(
        "\nFields extracted: {}/{}\n",
        record.filled_count(),
        InvoiceField::ALL.len()
    ));

    if !record.warnings.is_empty() {
        output.push_str("\nWarnings:\n");
        for warning in &record.warnings {
            output.push_str(&format!("  - {}\n", warning));
        }
    }

    output
}
