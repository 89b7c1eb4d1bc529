use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{ChunkCollection, DocumentCollection, LawCollection, LegalDocument};

pub fn run(args: StatusArgs) -> Result<()> {
    let output_dir = &args.output_dir;
    info!(output_dir = %output_dir.display(), "status requested");

    let laws_path = output_dir.join("individual_laws.json");
    if laws_path.exists() {
        let collection: LawCollection = read_json(&laws_path)?;
        info!(
            laws = collection.metadata.total_laws,
            extracted_at = %collection.metadata.extraction_date,
            source = %collection.metadata.source_file,
            "loaded individual-law collection"
        );
    } else {
        warn!(path = %laws_path.display(), "individual-law collection missing");
    }

    let documents_path = output_dir.join("documents.json");
    if documents_path.exists() {
        let collection: DocumentCollection = read_json(&documents_path)?;
        let total_articles: usize = collection
            .documents
            .iter()
            .map(LegalDocument::total_articles)
            .sum();
        info!(
            documents = collection.metadata.total_documents,
            articles = total_articles,
            processed_at = %collection.metadata.processing_date,
            "loaded processed-document collection"
        );
    } else {
        warn!(path = %documents_path.display(), "processed-document collection missing");
    }

    let chunks_path = output_dir.join("chunks.json");
    if chunks_path.exists() {
        let collection: ChunkCollection = read_json(&chunks_path)?;
        info!(
            chunks = collection.metadata.total_chunks,
            min_size = collection.metadata.chunking_config.min_size,
            max_size = collection.metadata.chunking_config.max_size,
            overlap = collection.metadata.chunking_config.overlap,
            "loaded chunk collection"
        );
    } else {
        warn!(path = %chunks_path.display(), "chunk collection missing");
    }

    let report_path = output_dir.join("processing_report.json");
    if report_path.exists() {
        let report: Value = read_json(&report_path)?;
        let summary = &report["pipeline_summary"];
        info!(
            status = %summary["status"].as_str().unwrap_or("unknown"),
            success_rate = summary["success_rate"].as_f64().unwrap_or(0.0),
            total_time_seconds = summary["total_time_seconds"].as_f64().unwrap_or(0.0),
            "loaded processing report"
        );
    } else {
        warn!(path = %report_path.display(), "processing report missing");
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
