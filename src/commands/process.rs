use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::chunker::{ChunkStats, Chunker};
use crate::cli::ProcessArgs;
use crate::config::ProcessingConfig;
use crate::metadata::{AnnotateStats, MetadataAnnotator, MetadataSummary};
use crate::model::{
    ChunkCollection, ChunkCollectionMeta, ChunkingConfigMeta, DocumentCollection,
    DocumentCollectionMeta, LawCollection, LawCollectionMeta, LawRecord, LegalDocument,
    ProcessingReport, ProcessingStatus, TextChunk,
};
use crate::normalize::TextNormalizer;
use crate::parser::{ParseStats, StructureParser};
use crate::repair::{RepairStats, TextRepairer};
use crate::splitter::{SplitStats, Splitter};
use crate::util::{ensure_directory, now_utc_string, write_json_pretty};

const INPUT_EXTENSION: &str = "txt";

#[derive(Debug, Serialize)]
struct PipelineSummary {
    status: String,
    total_time_seconds: f64,
    phase_times: BTreeMap<String, f64>,
    success_rate: f64,
}

#[derive(Debug, Serialize)]
struct PipelineCounts {
    laws_found: usize,
    valid_laws: usize,
    documents_parsed: usize,
    chunks_created: usize,
}

#[derive(Debug, Serialize)]
struct FinalReport {
    pipeline_summary: PipelineSummary,
    counts: PipelineCounts,
    component_statistics: serde_json::Value,
    stage_reports: Vec<ProcessingReport>,
    timestamp: String,
}

pub fn run(args: ProcessArgs) -> Result<()> {
    let started = Instant::now();
    let mut phase_times = BTreeMap::new();

    validate_input(&args.input)?;
    let config = load_config(&args)?;
    ensure_directory(&args.output_dir)?;

    let paragraphs = read_paragraphs(&args.input)?;
    info!(
        input = %args.input.display(),
        paragraphs = paragraphs.len(),
        "starting document processing"
    );

    // Stage 1: split the source into individual law records.
    let stage_start = Instant::now();
    let splitter = Splitter::new(config.clone())?;
    let outcome = splitter.split(&paragraphs);
    let split_stats = outcome.stats;
    let mut records = outcome.records;
    let split_report = split_stage_report(&split_stats);
    phase_times.insert("split".to_string(), stage_start.elapsed().as_secs_f64());
    info!(
        found = split_stats.laws_found,
        valid = split_stats.valid_laws,
        invalid = split_stats.invalid_laws,
        "law splitting completed"
    );

    // Stage 2: repair and normalize record text before structure parsing.
    let stage_start = Instant::now();
    let (repair_stats, repair_report) = repair_records(&mut records)?;
    phase_times.insert("clean".to_string(), stage_start.elapsed().as_secs_f64());
    info!(
        encoding_fixes = repair_stats.encoding_fixes,
        artifacts_removed = repair_stats.artifact_lines_removed,
        "text cleanup completed"
    );

    write_json_pretty(
        &args.output_dir.join("individual_laws.json"),
        &LawCollection {
            metadata: LawCollectionMeta {
                total_laws: records.len(),
                extraction_date: now_utc_string(),
                source_file: input_file_name(&args.input),
                source_sha256: outcome.source_sha256.clone(),
            },
            laws: records.clone(),
        },
    )?;

    // Stage 3: parse each record into its structural tree.
    let stage_start = Instant::now();
    let (documents, parse_stats, parse_report) = parse_records(&records)?;
    phase_times.insert("parse".to_string(), stage_start.elapsed().as_secs_f64());
    info!(
        documents = parse_stats.documents_parsed,
        articles = parse_stats.articles_extracted,
        chapters = parse_stats.chapters_found,
        errors = parse_stats.parsing_errors,
        "structure parsing completed"
    );

    // Stage 4: chunk the parsed documents.
    let stage_start = Instant::now();
    let chunker = Chunker::new(config.clone())?;
    let (chunks, chunk_stats, chunk_report) = chunker.chunk_batch(&documents);
    phase_times.insert("chunk".to_string(), stage_start.elapsed().as_secs_f64());
    info!(
        chunks = chunk_stats.total_chunks_created,
        oversized = chunk_stats.oversized_chunks,
        undersized = chunk_stats.undersized_chunks,
        elapsed_seconds = chunk_report.elapsed_seconds().unwrap_or(0.0),
        "chunking completed"
    );

    // Stage 5: annotate documents and build the batch summary.
    let stage_start = Instant::now();
    let (documents, annotate_stats, summary, metadata_report) =
        annotate_documents(documents, &chunks, &config)?;
    phase_times.insert("metadata".to_string(), stage_start.elapsed().as_secs_f64());
    info!(
        annotated = annotate_stats.documents_annotated,
        references = annotate_stats.references_found,
        "metadata generation completed"
    );

    write_json_pretty(
        &args.output_dir.join("documents.json"),
        &DocumentCollection {
            metadata: DocumentCollectionMeta {
                total_documents: documents.len(),
                processing_date: now_utc_string(),
            },
            documents: documents.clone(),
        },
    )?;
    write_json_pretty(
        &args.output_dir.join("chunks.json"),
        &ChunkCollection {
            metadata: ChunkCollectionMeta {
                total_chunks: chunks.len(),
                creation_date: now_utc_string(),
                chunking_config: ChunkingConfigMeta {
                    min_size: config.min_chunk_size,
                    max_size: config.max_chunk_size,
                    overlap: config.chunk_overlap,
                },
            },
            chunks,
        },
    )?;
    write_json_pretty(&args.output_dir.join("metadata.json"), &summary)?;

    let success_rate = parse_report.success_rate();
    let final_report = FinalReport {
        pipeline_summary: PipelineSummary {
            status: "completed".to_string(),
            total_time_seconds: started.elapsed().as_secs_f64(),
            phase_times,
            success_rate,
        },
        counts: PipelineCounts {
            laws_found: split_stats.laws_found,
            valid_laws: split_stats.valid_laws,
            documents_parsed: documents.len(),
            chunks_created: chunk_stats.total_chunks_created,
        },
        component_statistics: json!({
            "splitter": split_stats,
            "text_repair": repair_stats,
            "parser": parse_stats,
            "chunker": chunk_stats,
            "metadata": annotate_stats,
        }),
        stage_reports: vec![
            split_report,
            repair_report,
            parse_report,
            chunk_report,
            metadata_report,
        ],
        timestamp: now_utc_string(),
    };
    write_json_pretty(&args.output_dir.join("processing_report.json"), &final_report)?;

    info!(
        output_dir = %args.output_dir.display(),
        documents = documents.len(),
        success_rate = %format!("{success_rate:.1}%"),
        "processing completed"
    );

    Ok(())
}

fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("input file does not exist: {}", input.display());
    }

    let has_expected_extension = input
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.eq_ignore_ascii_case(INPUT_EXTENSION))
        .unwrap_or(false);
    if !has_expected_extension {
        bail!(
            "input file must have the .{INPUT_EXTENSION} extension: {}",
            input.display()
        );
    }

    Ok(())
}

fn load_config(args: &ProcessArgs) -> Result<ProcessingConfig> {
    let config = match &args.config {
        Some(path) => ProcessingConfig::load(path)?,
        None => ProcessingConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// The document-source contract: an ordered sequence of paragraph strings
/// in original document order, one per line of the export.
fn read_paragraphs(input: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(input)
        .with_context(|| format!("failed to read input file: {}", input.display()))?;

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn input_file_name(input: &Path) -> String {
    input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}

fn split_stage_report(stats: &SplitStats) -> ProcessingReport {
    let mut report = ProcessingReport::begin("document_splitting", stats.laws_found);
    report.processed_items = stats.valid_laws;
    report.failed_items = stats.invalid_laws + stats.extraction_errors;
    report
        .statistics
        .insert("splitting".to_string(), json!(stats));
    report.finish();
    report
}

fn repair_records(records: &mut [LawRecord]) -> Result<(RepairStats, ProcessingReport)> {
    let repairer = TextRepairer::new()?;
    let normalizer = TextNormalizer::new()?;
    let mut report = ProcessingReport::begin("text_processing", records.len());
    let mut stats = RepairStats::default();

    for record in records.iter_mut() {
        let (repaired, record_stats) = repairer.repair(&record.raw_content);
        stats.merge(record_stats);

        record.raw_content = repaired;
        record.title = normalizer.clean(&record.title);
        record.word_count = record.raw_content.split_whitespace().count();
        report.processed_items += 1;

        debug!(id = %record.id, words = record.word_count, "record text repaired");
    }

    report
        .statistics
        .insert("text_repair".to_string(), json!(stats));
    report.finish();

    Ok((stats, report))
}

fn parse_records(
    records: &[LawRecord],
) -> Result<(Vec<LegalDocument>, ParseStats, ProcessingReport)> {
    let parser = StructureParser::new()?;
    let mut report = ProcessingReport::begin("structure_parsing", records.len());
    let mut stats = ParseStats::default();
    let mut documents = Vec::new();

    for record in records {
        match parser.parse(record) {
            Ok(document) => {
                debug!(
                    id = %document.id,
                    articles = document.total_articles(),
                    chapters = document.chapters.len(),
                    "document parsed"
                );
                stats.absorb(&document);
                documents.push(document);
                report.processed_items += 1;
            }
            Err(error) => {
                let message = format!("failed to parse law record {}: {error:#}", record.id);
                warn!(id = %record.id, error = %error, "structure parsing failed");
                report.errors.push(message);
                report.failed_items += 1;
                stats.parsing_errors += 1;
            }
        }
    }

    report
        .statistics
        .insert("parsing".to_string(), json!(stats));
    report.finish();

    Ok((documents, stats, report))
}

fn annotate_documents(
    mut documents: Vec<LegalDocument>,
    chunks: &[TextChunk],
    config: &ProcessingConfig,
) -> Result<(
    Vec<LegalDocument>,
    AnnotateStats,
    MetadataSummary,
    ProcessingReport,
)> {
    let annotator = MetadataAnnotator::new(config.max_keywords)?;
    let mut report = ProcessingReport::begin("metadata_generation", documents.len());
    let mut stats = AnnotateStats::default();

    for document in &mut documents {
        stats.merge(annotator.annotate_document(document));
        document.status = ProcessingStatus::Completed;
        report.processed_items += 1;
    }

    let summary = annotator.generate_processing_summary(&documents, chunks);
    stats.quality_assessments += documents.len();

    report
        .statistics
        .insert("metadata".to_string(), json!(stats));
    report.finish();

    Ok((documents, stats, summary, report))
}
