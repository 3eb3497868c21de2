// src/main.rs
use clap::Parser;
use statement_extractor::document::{discover_company_documents, list_companies, load_document};
use statement_extractor::extractors::locator::DEBUG_PATTERNS;
use statement_extractor::extractors::vocabulary::FUZZY_MATCH_THRESHOLD;
use statement_extractor::storage::StorageManager;
use statement_extractor::utils::error::DocumentError;
use statement_extractor::utils::{logging, text_debug, AppError};
use statement_extractor::{Document, DocumentInput, Pipeline, PipelineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command Line Interface for the financial statement extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Company folder under the PDF folder (all companies if omitted)
    #[arg(short, long)]
    company: Option<String>,

    /// Folder holding one sub-folder of annual-report PDFs per company
    #[arg(long, default_value = "fin_statements")]
    pdf_folder: String,

    /// Output directory for extraction results
    #[arg(short, long, default_value = "output")]
    output_dir: String,

    /// Fiscal years to keep in the output, comma-separated (e.g. 2022,2023)
    #[arg(long, value_delimiter = ',')]
    years: Vec<u32>,

    /// Minimum similarity for a fuzzy vocabulary match (0.0 - 1.0)
    #[arg(long, default_value_t = FUZZY_MATCH_THRESHOLD)]
    fuzzy_threshold: f64,

    /// Debug mode - save annotated page text for each PDF
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments and setup logging (RUST_LOG overrides)
    let args = Args::parse();
    logging::setup_logging(args.debug);
    tracing::info!("Starting processing for args: {:?}", args);

    if !(0.0..=1.0).contains(&args.fuzzy_threshold) {
        return Err(AppError::Config(format!(
            "--fuzzy-threshold must be between 0 and 1, got {}",
            args.fuzzy_threshold
        )));
    }

    // 2. Resolve companies
    let pdf_folder = PathBuf::from(&args.pdf_folder);
    let companies = match &args.company {
        Some(company) => vec![company.clone()],
        None => list_companies(&pdf_folder).await?,
    };
    if companies.is_empty() {
        return Err(AppError::Config(format!("No company folders found under {}", pdf_folder.display())));
    }

    // 3. Initialize storage and pipeline
    let storage = StorageManager::new(&args.output_dir)?;
    let pipeline = Arc::new(Pipeline::new(PipelineConfig {
        fuzzy_match_threshold: args.fuzzy_threshold,
        ..PipelineConfig::default()
    }));

    // 4. Process each company
    let mut success_count = 0;
    let mut failure_count = 0;

    for company in companies {
        let inputs = match discover_company_documents(&pdf_folder, &company).await {
            Ok(inputs) if !inputs.is_empty() => inputs,
            Ok(_) => {
                tracing::warn!("No annual reports with a fiscal year found for {}", company);
                failure_count += 1;
                continue;
            }
            Err(e) => {
                tracing::error!("Failed to read documents for {}: {}", company, e);
                failure_count += 1;
                continue;
            }
        };
        tracing::info!("Found {} annual reports for {}", inputs.len(), company);

        let debug_dir = if args.debug { Some(storage.debug_dir(&company)?) } else { None };

        // PDF parsing is CPU-bound and synchronous
        let worker = Arc::clone(&pipeline);
        let worker_company = company.clone();
        let result = tokio::task::spawn_blocking(move || {
            let loaded: Vec<_> = inputs
                .iter()
                .map(|input| (input, load_document(&worker_company, input)))
                .collect();
            if let Some(dir) = &debug_dir {
                write_debug_dumps(&loaded, dir);
            }
            worker.run_loaded(&worker_company, &loaded)
        })
        .await
        .map_err(|e| AppError::Processing(format!("extraction task for {} failed: {}", company, e)))?;

        let result = if args.years.is_empty() { result } else { result.for_years(&args.years) };

        if result.records.is_empty() {
            tracing::warn!("No line items extracted for {}", company);
            failure_count += 1;
        } else {
            success_count += 1;
        }

        match storage.save_result(&result) {
            Ok(path) => tracing::info!("Saved extraction result to: {}", path.display()),
            Err(e) => tracing::error!("Failed to save extraction result: {}", e),
        }
        match storage.save_extraction_log(&result) {
            Ok(path) => tracing::info!("Saved extraction log to: {}", path.display()),
            Err(e) => tracing::error!("Failed to save extraction log: {}", e),
        }
    }

    tracing::info!("Processing finished. Success: {}, Failures: {}", success_count, failure_count);

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!(
            "Failed to extract any statements for {} companies",
            failure_count
        )));
    }

    Ok(())
}

/// Annotated page text per readable PDF. Failures only log; the pipeline
/// reports unreadable documents itself.
fn write_debug_dumps(loaded: &[(&DocumentInput, Result<Document, DocumentError>)], dir: &Path) {
    for (input, outcome) in loaded {
        let Ok(document) = outcome else {
            tracing::warn!("No debug dump for unreadable {}", input.source_name);
            continue;
        };
        let path = dir.join(format!("{}_pages.txt", input.source_name));
        if let Err(e) = text_debug::create_debug_dump(document, &path, DEBUG_PATTERNS) {
            tracing::warn!("Failed to create debug dump: {}", e);
        }
    }
}
