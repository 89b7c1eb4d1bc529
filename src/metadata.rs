use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::model::{
    ChunkType, DocumentType, LegalDocument, QualityAssessment, TextChunk, UNKNOWN_LABEL,
};
use crate::normalize::{LEGAL_TERMS, TextNormalizer};

/// Keyword lists per legal-domain category; a document carries a category
/// once at least two of its keywords appear. Spellings are post-
/// normalization (أ already resolved to ا).
const CATEGORY_TABLE: &[(&str, &[&str])] = &[
    ("اداری", &["اداری", "ادارات", "بروکراسی", "مدیریت", "سازمان"]),
    ("آموزشی", &["آموزش", "تحصیل", "دانشگاه", "دانشکده", "دانشجو"]),
    ("پژوهشی", &["پژوهش", "تحقیق", "تحقیقات", "علمی", "فناوری"]),
    ("مالی", &["مالی", "بودجه", "هزینه", "اعتبار", "تامین"]),
    ("حقوقی", &["حقوق", "قانون", "مقررات", "آیین‌نامه", "دستورالعمل"]),
    ("انتظامی", &["انتظامی", "تادیب", "تخلف", "جزا", "مجازات"]),
];

const CATEGORY_MIN_HITS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct LegalReference {
    pub ref_type: String,
    pub text: String,
    pub value: String,
    pub position: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ComplexityMetrics {
    pub structural_complexity: f64,
    pub textual_complexity: f64,
    pub legal_complexity: f64,
    pub overall_complexity: f64,
}

/// Per-call annotation counts, accumulated by the batch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnnotateStats {
    pub documents_annotated: usize,
    pub keywords_extracted: usize,
    pub references_found: usize,
    pub quality_assessments: usize,
}

impl AnnotateStats {
    pub fn merge(&mut self, other: AnnotateStats) {
        self.documents_annotated += other.documents_annotated;
        self.keywords_extracted += other.keywords_extracted;
        self.references_found += other.references_found;
        self.quality_assessments += other.quality_assessments;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatistics {
    pub total_documents: usize,
    pub document_types: BTreeMap<String, usize>,
    pub approval_authorities: BTreeMap<String, usize>,
    pub total_articles: usize,
    pub total_chapters: usize,
    pub average_word_count: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkStatistics {
    pub total_chunks: usize,
    pub chunk_types: BTreeMap<String, usize>,
    pub average_chunk_size: f64,
    pub small_chunks: usize,
    pub medium_chunks: usize,
    pub large_chunks: usize,
    pub average_importance: f64,
    pub high_importance_chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityStatistics {
    pub average_quality: f64,
    pub high_quality_documents: usize,
    pub problematic_documents: usize,
    pub common_issues: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataSummary {
    pub generated_at: String,
    pub document_statistics: DocumentStatistics,
    pub chunk_statistics: ChunkStatistics,
    pub quality_statistics: QualityStatistics,
    pub recommendations: Vec<String>,
}

/// Computes keywords, legal references, authority/category tags, and
/// quality scores for documents and chunks. Only the document metadata
/// field is ever mutated.
#[derive(Debug)]
pub struct MetadataAnnotator {
    normalizer: TextNormalizer,
    reference_patterns: Vec<(Regex, &'static str)>,
    authority_table: Vec<(Vec<Regex>, &'static str)>,
    max_keywords: usize,
}

impl MetadataAnnotator {
    pub fn new(max_keywords: usize) -> Result<Self> {
        let reference_specs: [(&str, &str); 8] = [
            (r"قانون\s+([^.،؛\n]+)", "law"),
            (r"آیین‌نامه\s+([^.،؛\n]+)", "regulation"),
            (r"دستورالعمل\s+([^.،؛\n]+)", "instruction"),
            (r"ماده\s*([0-9۰-۹]+|واحده)", "article"),
            (r"تبصره\s*([0-9۰-۹]+)", "note"),
            (r"بند\s*([0-9۰-۹]+)", "subsection"),
            (r"فصل\s*([0-9۰-۹]+)", "chapter"),
            (r"مصوب\s*([0-9۰-۹/]+)", "approval_date"),
        ];
        let reference_patterns = reference_specs
            .iter()
            .map(|(pattern, ref_type)| {
                Regex::new(pattern)
                    .with_context(|| format!("failed to compile reference pattern: {pattern}"))
                    .map(|regex| (regex, *ref_type))
            })
            .collect::<Result<Vec<_>>>()?;

        let authority_specs: [(&[&str], &str); 4] = [
            (
                &[r"مجلس\s*شورای\s*اسلامی", r"مجلس", r"پارلمان"],
                "مجلس شورای اسلامی",
            ),
            (
                &[r"هی[ائ]ت[\s‌]*وزیران", r"کابینه"],
                "هیئت‌وزیران",
            ),
            (
                &[r"شورای\s*عالی\s*انقلاب\s*فرهنگی", r"شعاف"],
                "شورای عالی انقلاب فرهنگی",
            ),
            (&[r"وزارت\s*علوم", r"وزیر\s*علوم"], "وزارت علوم"),
        ];
        let authority_table = authority_specs
            .iter()
            .map(|(patterns, authority)| {
                patterns
                    .iter()
                    .map(|pattern| {
                        Regex::new(pattern).with_context(|| {
                            format!("failed to compile authority pattern: {pattern}")
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|compiled| (compiled, *authority))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            normalizer: TextNormalizer::new()?,
            reference_patterns,
            authority_table,
            max_keywords,
        })
    }

    /// Fills the document's metadata extension slot with keywords,
    /// categories, references, and complexity metrics. Returns the counts
    /// the batch loop accumulates.
    pub fn annotate_document(&self, document: &mut LegalDocument) -> AnnotateStats {
        let keywords = self.extract_document_keywords(document);
        let raw = document.raw_content.clone().unwrap_or_default();
        let references = self.extract_legal_references(&raw);
        let categories = self.categorize_document(document);
        let complexity = self.complexity_metrics(document, &references);

        let stats = AnnotateStats {
            documents_annotated: 1,
            keywords_extracted: keywords.len(),
            references_found: references.len(),
            quality_assessments: 0,
        };

        document.metadata.complexity_score = complexity.overall_complexity;
        document.metadata.extra.insert("keywords".to_string(), json!(keywords));
        document
            .metadata
            .extra
            .insert("categories".to_string(), json!(categories));
        document
            .metadata
            .extra
            .insert("legal_references".to_string(), json!(references));
        document
            .metadata
            .extra
            .insert("complexity_metrics".to_string(), json!(complexity));
        document.metadata.extra.insert(
            "statistics".to_string(),
            json!({
                "chapter_count": document.chapters.len(),
                "article_count": document.total_articles(),
                "footnote_count": document.footnotes.len(),
                "approval_authority": document.approval_authority,
            }),
        );
        document.metadata.extra.insert(
            "generation_timestamp".to_string(),
            json!(crate::util::now_utc_string()),
        );

        stats
    }

    pub fn extract_document_keywords(&self, document: &LegalDocument) -> Vec<String> {
        let mut parts: Vec<&str> = vec![&document.title];

        for chapter in &document.chapters {
            parts.push(&chapter.title);
        }
        for article in document.articles() {
            parts.push(&article.title);
            parts.push(&article.content);
            for subsection in &article.subsections {
                parts.push(&subsection.content);
            }
            for note in &article.notes {
                parts.push(&note.content);
            }
        }
        for footnote in &document.footnotes {
            parts.push(footnote);
        }

        let combined = parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        self.normalizer.extract_keywords(&combined, self.max_keywords)
    }

    pub fn extract_legal_references(&self, text: &str) -> Vec<LegalReference> {
        let mut references = Vec::new();

        for (pattern, ref_type) in &self.reference_patterns {
            for captures in pattern.captures_iter(text) {
                let whole = captures.get(0).expect("match has a full capture");
                let value = captures
                    .get(1)
                    .map_or_else(|| whole.as_str(), |group| group.as_str());
                references.push(LegalReference {
                    ref_type: (*ref_type).to_string(),
                    text: whole.as_str().trim().to_string(),
                    value: value.trim().to_string(),
                    position: whole.start(),
                });
            }
        }

        references
    }

    /// Ordered table scan; the first matching pattern names the authority.
    pub fn identify_approval_authority(&self, text: &str) -> &'static str {
        for (patterns, authority) in &self.authority_table {
            if patterns.iter().any(|pattern| pattern.is_match(text)) {
                return authority;
            }
        }
        UNKNOWN_LABEL
    }

    pub fn categorize_document(&self, document: &LegalDocument) -> Vec<String> {
        let mut haystack = document.title.clone();
        if let Some(raw) = &document.raw_content {
            haystack.push(' ');
            haystack.push_str(raw);
        }

        let mut categories = Vec::new();
        for (category, keywords) in CATEGORY_TABLE {
            let hits = keywords
                .iter()
                .filter(|keyword| haystack.contains(**keyword))
                .count();
            if hits >= CATEGORY_MIN_HITS {
                categories.push((*category).to_string());
            }
        }

        if categories.is_empty() {
            let fallback = if document.document_type == DocumentType::Law {
                "قانونی"
            } else {
                "عمومی"
            };
            categories.push(fallback.to_string());
        }

        categories
    }

    fn complexity_metrics(
        &self,
        document: &LegalDocument,
        references: &[LegalReference],
    ) -> ComplexityMetrics {
        let chapter_count = document.chapters.len();
        let total_articles = document.total_articles();
        let mut total_subsections = 0;
        let mut total_notes = 0;
        for article in document.articles() {
            total_subsections += article.subsections.len();
            total_notes += article.notes.len();
        }

        let structural = f64::min(
            chapter_count as f64 * 0.1
                + total_articles as f64 * 0.05
                + total_subsections as f64 * 0.02
                + total_notes as f64 * 0.03,
            1.0,
        );

        let total_words = document.total_word_count();
        let raw = document.raw_content.as_deref().unwrap_or_default();
        let sentences = self.normalizer.split_sentences(raw);
        let average_sentence_length = if sentences.is_empty() {
            0.0
        } else {
            total_words as f64 / sentences.len() as f64
        };
        let textual = f64::min(
            total_words as f64 / 10_000.0 + average_sentence_length / 50.0,
            1.0,
        );

        let legal_term_count = LEGAL_TERMS
            .iter()
            .filter(|term| raw.contains(**term))
            .count();
        let legal = f64::min(
            references.len() as f64 * 0.05 + legal_term_count as f64 * 0.02,
            1.0,
        );

        ComplexityMetrics {
            structural_complexity: structural,
            textual_complexity: textual,
            legal_complexity: legal,
            overall_complexity: structural * 0.4 + textual * 0.3 + legal * 0.3,
        }
    }

    /// Three independent sub-scores averaged unweighted; every fired
    /// penalty leaves an issue string behind.
    pub fn assess_document_quality(&self, document: &LegalDocument) -> QualityAssessment {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let mut structure_score: f64 = 1.0;
        if document.title.trim().is_empty() {
            issues.push("عنوان سند خالی است".to_string());
            structure_score -= 0.3;
        }
        if document.total_articles() == 0 {
            issues.push("هیچ ماده‌ای در سند یافت نشد".to_string());
            structure_score -= 0.5;
        }
        if document.approval_date.trim().is_empty() || document.approval_date == UNKNOWN_LABEL {
            issues.push("تاریخ تصویب مشخص نیست".to_string());
            structure_score -= 0.2;
        }

        let mut content_score: f64 = 1.0;
        if document.total_word_count() < 50 {
            issues.push("محتوای سند بسیار کوتاه است".to_string());
            content_score -= 0.4;
        }
        if let Some(raw) = &document.raw_content {
            if !self.normalizer.is_valid_persian_text(raw) {
                issues.push("محتوای فارسی نامعتبر یا ناکافی".to_string());
                content_score -= 0.3;
            }
        }

        let missing_fields = [
            document.title.as_str(),
            document.approval_date.as_str(),
            document.document_type.as_str(),
        ]
        .iter()
        .filter(|field| field.trim().is_empty() || *field == &UNKNOWN_LABEL)
        .count();
        let completeness_score: f64 = 1.0 - missing_fields as f64 * 0.2;

        let structure_score = structure_score.clamp(0.0, 1.0);
        let content_score = content_score.clamp(0.0, 1.0);
        let completeness_score = completeness_score.clamp(0.0, 1.0);
        let overall_score =
            ((structure_score + content_score + completeness_score) / 3.0).clamp(0.0, 1.0);

        if overall_score < 0.6 {
            recommendations
                .push("کیفیت کلی سند پایین است - بازنگری کامل توصیه می‌شود".to_string());
        }
        if structure_score < 0.7 {
            recommendations.push("ساختار سند نیاز به بهبود دارد".to_string());
        }
        if content_score < 0.7 {
            recommendations.push("محتوای سند نیاز به تکمیل و بهبود دارد".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("کیفیت سند قابل قبول است".to_string());
        }

        QualityAssessment {
            document_id: document.id.clone(),
            overall_score,
            structure_score,
            content_score,
            completeness_score,
            issues,
            recommendations,
            assessed_at: Utc::now(),
        }
    }

    /// Auxiliary chunk annotation: never mutates the chunk itself.
    pub fn annotate_chunk(
        &self,
        chunk: &TextChunk,
        document: &LegalDocument,
    ) -> BTreeMap<String, Value> {
        let chunk_keywords = self.normalizer.extract_keywords(&chunk.content, 10);
        let chunk_references = self.extract_legal_references(&chunk.content);
        let importance = self.chunk_importance(chunk, &chunk_references, &chunk_keywords);

        let mut annotation = BTreeMap::new();
        annotation.insert("chunk_keywords".to_string(), json!(chunk_keywords));
        annotation.insert("legal_references".to_string(), json!(chunk_references));
        annotation.insert("importance_score".to_string(), json!(importance));
        annotation.insert(
            "source_document_title".to_string(),
            json!(document.title),
        );
        annotation.insert(
            "source_document_type".to_string(),
            json!(document.document_type.as_str()),
        );
        annotation.insert(
            "extraction_quality".to_string(),
            json!(self.assess_chunk_quality(chunk)),
        );
        annotation
    }

    /// Weighted sum of the chunk-type base, a capped reference bonus, and
    /// a capped legal-vocabulary bonus.
    pub fn chunk_importance(
        &self,
        chunk: &TextChunk,
        references: &[LegalReference],
        keywords: &[String],
    ) -> f64 {
        let base = match chunk.chunk_type {
            ChunkType::Article => 0.5,
            ChunkType::Note => 0.3,
            ChunkType::Subsection => 0.2,
            _ => 0.0,
        };

        let reference_bonus = f64::min(references.len() as f64 * 0.1, 0.3);
        let legal_keyword_count = keywords
            .iter()
            .filter(|keyword| LEGAL_TERMS.contains(&keyword.as_str()))
            .count();
        let keyword_bonus = f64::min(legal_keyword_count as f64 * 0.05, 0.2);

        f64::min(base + reference_bonus + keyword_bonus, 1.0)
    }

    pub fn assess_chunk_quality(&self, chunk: &TextChunk) -> f64 {
        let mut score: f64 = 1.0;

        if chunk.character_count < 100 {
            score -= 0.3;
        } else if chunk.character_count > 1500 {
            score -= 0.2;
        }

        if !self.normalizer.is_valid_persian_text(&chunk.content) {
            score -= 0.4;
        }

        if matches!(chunk.chunk_type, ChunkType::Article | ChunkType::Note)
            && chunk.word_count < 10
        {
            score -= 0.2;
        }

        score.max(0.0)
    }

    /// Batch summary over everything the pipeline produced, plus the
    /// system recommendations derived from it.
    pub fn generate_processing_summary(
        &self,
        documents: &[LegalDocument],
        chunks: &[TextChunk],
    ) -> MetadataSummary {
        let mut document_types = BTreeMap::new();
        let mut approval_authorities = BTreeMap::new();
        for document in documents {
            *document_types
                .entry(document.document_type.as_str().to_string())
                .or_insert(0) += 1;
            *approval_authorities
                .entry(document.approval_authority.clone())
                .or_insert(0) += 1;
        }

        let document_statistics = DocumentStatistics {
            total_documents: documents.len(),
            document_types,
            approval_authorities,
            total_articles: documents.iter().map(LegalDocument::total_articles).sum(),
            total_chapters: documents.iter().map(|doc| doc.chapters.len()).sum(),
            average_word_count: average(
                documents.iter().map(|doc| doc.total_word_count() as f64),
            ),
        };

        let mut chunk_types = BTreeMap::new();
        let mut importance_total = 0.0;
        let mut high_importance = 0;
        for chunk in chunks {
            *chunk_types
                .entry(chunk.chunk_type.as_str().to_string())
                .or_insert(0) += 1;

            let references = self.extract_legal_references(&chunk.content);
            let importance = self.chunk_importance(chunk, &references, &chunk.keywords);
            importance_total += importance;
            if importance >= 0.7 {
                high_importance += 1;
            }
        }

        let chunk_statistics = ChunkStatistics {
            total_chunks: chunks.len(),
            chunk_types,
            average_chunk_size: average(
                chunks.iter().map(|chunk| chunk.character_count as f64),
            ),
            small_chunks: chunks.iter().filter(|c| c.character_count < 300).count(),
            medium_chunks: chunks
                .iter()
                .filter(|c| (300..=800).contains(&c.character_count))
                .count(),
            large_chunks: chunks.iter().filter(|c| c.character_count > 800).count(),
            average_importance: if chunks.is_empty() {
                0.0
            } else {
                importance_total / chunks.len() as f64
            },
            high_importance_chunks: high_importance,
        };

        let assessments: Vec<QualityAssessment> = documents
            .iter()
            .map(|document| self.assess_document_quality(document))
            .collect();
        let mut common_issues = BTreeMap::new();
        for assessment in &assessments {
            for issue in &assessment.issues {
                *common_issues.entry(issue.clone()).or_insert(0) += 1;
            }
        }
        let quality_statistics = QualityStatistics {
            average_quality: average(assessments.iter().map(|a| a.overall_score)),
            high_quality_documents: assessments
                .iter()
                .filter(|a| a.overall_score >= 0.8)
                .count(),
            problematic_documents: assessments
                .iter()
                .filter(|a| a.overall_score < 0.6)
                .count(),
            common_issues,
        };

        let recommendations =
            self.system_recommendations(documents, chunks, &quality_statistics);

        MetadataSummary {
            generated_at: crate::util::now_utc_string(),
            document_statistics,
            chunk_statistics,
            quality_statistics,
            recommendations,
        }
    }

    fn system_recommendations(
        &self,
        documents: &[LegalDocument],
        chunks: &[TextChunk],
        quality: &QualityStatistics,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();

        if documents.is_empty() {
            recommendations.push("هیچ سندی پردازش نشده است".to_string());
            return recommendations;
        }

        if quality.average_quality < 0.6 {
            recommendations.push(
                "کیفیت متوسط اسناد پایین است - بازنگری فرآیند استخراج لازم".to_string(),
            );
        }

        if !chunks.is_empty() {
            let average_size = average(chunks.iter().map(|c| c.character_count as f64));
            if average_size < 200.0 {
                recommendations.push(
                    "اندازه متوسط قطعات کوچک است - افزایش حداقل اندازه توصیه می‌شود".to_string(),
                );
            } else if average_size > 1200.0 {
                recommendations.push(
                    "اندازه متوسط قطعات بزرگ است - کاهش حداکثر اندازه توصیه می‌شود".to_string(),
                );
            }
        }

        let with_chapters = documents
            .iter()
            .filter(|document| !document.chapters.is_empty())
            .count();
        if (with_chapters as f64) < documents.len() as f64 * 0.5 {
            recommendations.push(
                "اکثر اسناد ساختار فصل‌بندی ندارند - بررسی الگوریتم تشخیص فصل".to_string(),
            );
        }

        if recommendations.is_empty() {
            recommendations.push("پردازش با کیفیت مطلوبی انجام شده است".to_string());
        }

        recommendations
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}
