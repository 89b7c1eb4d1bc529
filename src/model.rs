use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_LABEL: &str = "نامشخص";

pub const AUTHORITY_PARLIAMENT: &str = "مجلس شورای اسلامی";
pub const AUTHORITY_CABINET: &str = "هیئت‌وزیران";
pub const AUTHORITY_SUPREME_COUNCIL: &str = "شورای عالی انقلاب فرهنگی";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "قانون")]
    Law,
    #[serde(rename = "آیین‌نامه")]
    Regulation,
    #[serde(rename = "دستورالعمل")]
    Instruction,
    #[serde(rename = "مصوبه")]
    Resolution,
    #[serde(rename = "بخشنامه")]
    Circular,
    #[serde(rename = "نامشخص")]
    Unknown,
}

impl DocumentType {
    /// Infers the document type from title keywords, most specific first.
    pub fn from_title(title: &str) -> Self {
        if title.contains("قانون") {
            Self::Law
        } else if title.contains("آیین‌نامه") || title.contains("آیین نامه") {
            Self::Regulation
        } else if title.contains("دستورالعمل") {
            Self::Instruction
        } else if title.contains("مصوبه") {
            Self::Resolution
        } else if title.contains("بخشنامه") {
            Self::Circular
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Law => "قانون",
            Self::Regulation => "آیین‌نامه",
            Self::Instruction => "دستورالعمل",
            Self::Resolution => "مصوبه",
            Self::Circular => "بخشنامه",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsectionKind {
    Numbered,
    Lettered,
    Dash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    #[serde(rename = "در انتظار")]
    Pending,
    #[serde(rename = "در حال پردازش")]
    Processing,
    #[serde(rename = "تکمیل شده")]
    Completed,
    #[serde(rename = "خطا")]
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Article,
    Note,
    Subsection,
    ChapterTitle,
    Footnote,
    Combined,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Note => "note",
            Self::Subsection => "subsection",
            Self::ChapterTitle => "chapter_title",
            Self::Footnote => "footnote",
            Self::Combined => "combined",
        }
    }
}

/// One self-contained statute extracted from the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawRecord {
    pub id: String,
    pub title: String,
    pub approval_date: String,
    pub approval_authority: String,
    pub raw_content: String,
    pub word_count: usize,
    pub extraction_timestamp: String,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subsection {
    pub number: String,
    pub content: String,
    pub kind: SubsectionKind,
    pub keywords: Vec<String>,
}

impl Subsection {
    pub fn new(
        number: String,
        content: String,
        kind: SubsectionKind,
        keywords: Vec<String>,
    ) -> Result<Self> {
        let content = content.trim().to_string();
        if content.is_empty() {
            bail!("subsection {number} has empty content");
        }
        Ok(Self {
            number,
            content,
            kind,
            keywords,
        })
    }
}

/// An explanatory clause (تبصره) attached to an article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub number: String,
    pub content: String,
    pub subsections: Vec<Subsection>,
    pub keywords: Vec<String>,
}

impl Note {
    pub fn new(
        number: String,
        content: String,
        subsections: Vec<Subsection>,
        keywords: Vec<String>,
    ) -> Result<Self> {
        let content = content.trim().to_string();
        if content.is_empty() {
            bail!("note {number} has empty content");
        }
        Ok(Self {
            number,
            content,
            subsections,
            keywords,
        })
    }
}

/// The primary numbered provision unit (ماده).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub number: String,
    pub title: String,
    pub content: String,
    pub subsections: Vec<Subsection>,
    pub notes: Vec<Note>,
    pub keywords: Vec<String>,
    pub word_count: usize,
}

impl Article {
    pub fn new(
        number: String,
        title: String,
        content: String,
        subsections: Vec<Subsection>,
        notes: Vec<Note>,
        keywords: Vec<String>,
    ) -> Result<Self> {
        let content = content.trim().to_string();
        if content.is_empty() {
            bail!("article {number} has empty content");
        }
        let word_count = content.split_whitespace().count();
        Ok(Self {
            number,
            title,
            content,
            subsections,
            notes,
            keywords,
            word_count,
        })
    }
}

/// A top-level grouping of articles (فصل).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub number: String,
    pub title: String,
    pub articles: Vec<Article>,
}

impl Chapter {
    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    pub fn total_word_count(&self) -> usize {
        self.articles.iter().map(|article| article.word_count).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub word_count: usize,
    pub character_count: usize,
    pub structure_type: String,
    pub has_footnotes: bool,
    pub complexity_score: f64,
    pub quality_score: f64,
    pub processing_time: Option<f64>,
    pub extraction_errors: Vec<String>,
    /// Typed extension slot for annotator output (keywords, categories,
    /// references, complexity metrics).
    pub extra: BTreeMap<String, Value>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            word_count: 0,
            character_count: 0,
            structure_type: UNKNOWN_LABEL.to_string(),
            has_footnotes: false,
            complexity_score: 0.0,
            quality_score: 0.0,
            processing_time: None,
            extraction_errors: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// A fully parsed statute. Articles either live inside `chapters` or, when
/// the document has no chapter structure, in `standalone_articles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalDocument {
    pub id: String,
    pub title: String,
    pub approval_date: String,
    pub approval_authority: String,
    pub document_type: DocumentType,
    pub chapters: Vec<Chapter>,
    pub standalone_articles: Vec<Article>,
    pub footnotes: Vec<String>,
    pub metadata: DocumentMetadata,
    pub raw_content: Option<String>,
    pub status: ProcessingStatus,
}

impl LegalDocument {
    pub fn new(
        id: String,
        title: String,
        approval_date: String,
        approval_authority: String,
        document_type: DocumentType,
    ) -> Result<Self> {
        let title = title.trim().to_string();
        if title.is_empty() {
            bail!("document {id} has empty title");
        }

        Ok(Self {
            id,
            title,
            approval_date: non_empty_or_unknown(approval_date),
            approval_authority: non_empty_or_unknown(approval_authority),
            document_type,
            chapters: Vec::new(),
            standalone_articles: Vec::new(),
            footnotes: Vec::new(),
            metadata: DocumentMetadata::default(),
            raw_content: None,
            status: ProcessingStatus::Pending,
        })
    }

    pub fn total_articles(&self) -> usize {
        let chapter_articles: usize = self
            .chapters
            .iter()
            .map(|chapter| chapter.articles.len())
            .sum();
        chapter_articles + self.standalone_articles.len()
    }

    pub fn total_word_count(&self) -> usize {
        let chapter_words: usize = self
            .chapters
            .iter()
            .map(|chapter| chapter.total_word_count())
            .sum();
        let standalone_words: usize = self
            .standalone_articles
            .iter()
            .map(|article| article.word_count)
            .sum();
        chapter_words + standalone_words
    }

    /// All articles in document order, chapter articles first.
    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.chapters
            .iter()
            .flat_map(|chapter| chapter.articles.iter())
            .chain(self.standalone_articles.iter())
    }
}

fn non_empty_or_unknown(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A bounded text fragment sized for retrieval indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_type: ChunkType,
    pub position: usize,
    pub word_count: usize,
    pub character_count: usize,
    pub keywords: Vec<String>,
    pub legal_references: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl TextChunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        document_id: String,
        content: String,
        chunk_type: ChunkType,
        position: usize,
        keywords: Vec<String>,
        legal_references: Vec<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Result<Self> {
        let content = content.trim().to_string();
        if content.is_empty() {
            bail!("chunk {id} has empty content");
        }
        let word_count = content.split_whitespace().count();
        let character_count = content.chars().count();

        Ok(Self {
            id,
            document_id,
            content,
            chunk_type,
            position,
            word_count,
            character_count,
            keywords,
            legal_references,
            metadata,
        })
    }
}

/// Per-batch-operation record, created when a stage starts and finalized
/// when it ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub operation_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ProcessingStatus,
    pub total_items: usize,
    pub processed_items: usize,
    pub failed_items: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub statistics: BTreeMap<String, Value>,
}

impl ProcessingReport {
    pub fn begin(operation_type: &str, total_items: usize) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: ProcessingStatus::Processing,
            total_items,
            processed_items: 0,
            failed_items: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            statistics: BTreeMap::new(),
        }
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
        self.status = ProcessingStatus::Completed;
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.end_time.map(|end| {
            let elapsed = end.signed_duration_since(self.start_time);
            elapsed.num_milliseconds() as f64 / 1000.0
        })
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        (self.processed_items as f64 / self.total_items as f64) * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub document_id: String,
    pub overall_score: f64,
    pub structure_score: f64,
    pub content_score: f64,
    pub completeness_score: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

/// Persisted shape of the individual-law collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawCollection {
    pub metadata: LawCollectionMeta,
    pub laws: Vec<LawRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawCollectionMeta {
    pub total_laws: usize,
    pub extraction_date: String,
    pub source_file: String,
    pub source_sha256: String,
}

/// Persisted shape of the processed-document collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCollection {
    pub metadata: DocumentCollectionMeta,
    pub documents: Vec<LegalDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCollectionMeta {
    pub total_documents: usize,
    pub processing_date: String,
}

/// Persisted shape of the chunk collection, carrying the chunking
/// configuration the chunks were produced under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCollection {
    pub metadata: ChunkCollectionMeta,
    pub chunks: Vec<TextChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCollectionMeta {
    pub total_chunks: usize,
    pub creation_date: String,
    pub chunking_config: ChunkingConfigMeta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfigMeta {
    pub min_size: usize,
    pub max_size: usize,
    pub overlap: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_inferred_from_title_keywords() {
        assert_eq!(
            DocumentType::from_title("قانون مقررات انتظامی"),
            DocumentType::Law
        );
        assert_eq!(
            DocumentType::from_title("آیین‌نامه اجرایی"),
            DocumentType::Regulation
        );
        assert_eq!(DocumentType::from_title("متن بدون نوع"), DocumentType::Unknown);
    }

    #[test]
    fn empty_document_title_is_rejected() {
        let result = LegalDocument::new(
            "doc_001".to_string(),
            "   ".to_string(),
            "نامشخص".to_string(),
            "نامشخص".to_string(),
            DocumentType::Unknown,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_article_content_is_rejected() {
        let result = Article::new(
            "ماده ۱".to_string(),
            String::new(),
            "  ".to_string(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn total_articles_sums_chapters_and_standalone() {
        let article = |number: &str| {
            Article::new(
                number.to_string(),
                String::new(),
                "متن ماده".to_string(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
            )
            .expect("article builds")
        };

        let mut document = LegalDocument::new(
            "doc_001".to_string(),
            "قانون نمونه".to_string(),
            "01/01/1400".to_string(),
            AUTHORITY_PARLIAMENT.to_string(),
            DocumentType::Law,
        )
        .expect("document builds");

        document.chapters.push(Chapter {
            number: "فصل اول".to_string(),
            title: "کلیات".to_string(),
            articles: vec![article("ماده ۱"), article("ماده ۲")],
        });
        document.standalone_articles.push(article("ماده ۳"));

        let chapter_sum: usize = document
            .chapters
            .iter()
            .map(Chapter::article_count)
            .sum();
        assert_eq!(
            document.total_articles(),
            chapter_sum + document.standalone_articles.len()
        );
        assert_eq!(document.total_articles(), 3);
    }

    #[test]
    fn blank_approval_fields_fall_back_to_unknown() {
        let document = LegalDocument::new(
            "doc_002".to_string(),
            "قانون نمونه".to_string(),
            "  ".to_string(),
            String::new(),
            DocumentType::Law,
        )
        .expect("document builds");

        assert_eq!(document.approval_date, UNKNOWN_LABEL);
        assert_eq!(document.approval_authority, UNKNOWN_LABEL);
    }

    #[test]
    fn chunk_counts_are_computed_from_content() {
        let chunk = TextChunk::new(
            "doc_001_art0_003".to_string(),
            "doc_001".to_string(),
            "ماده ۱ متن نمونه".to_string(),
            ChunkType::Article,
            0,
            Vec::new(),
            vec!["ماده ۱".to_string()],
            BTreeMap::new(),
        )
        .expect("chunk builds");

        assert_eq!(chunk.word_count, 4);
        assert_eq!(chunk.character_count, "ماده ۱ متن نمونه".chars().count());
    }

    #[test]
    fn empty_chunk_content_is_rejected() {
        let result = TextChunk::new(
            "c1".to_string(),
            "doc".to_string(),
            "  ".to_string(),
            ChunkType::Note,
            0,
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn report_success_rate_handles_empty_batches() {
        let mut report = ProcessingReport::begin("split", 0);
        report.finish();
        assert_eq!(report.success_rate(), 0.0);
        assert_eq!(report.status, ProcessingStatus::Completed);

        let mut report = ProcessingReport::begin("split", 4);
        report.processed_items = 3;
        assert_eq!(report.success_rate(), 75.0);
    }

}
