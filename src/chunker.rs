use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ProcessingConfig;
use crate::model::{
    Article, Chapter, ChunkType, LegalDocument, ProcessingReport, TextChunk,
};
use crate::normalize::TextNormalizer;
use crate::util::now_utc_string;

const ARTICLE_CHUNK_KEYWORDS: usize = 10;
const CHILD_CHUNK_KEYWORDS: usize = 5;

/// Counters derived from emitted chunks; the batch loop owns and
/// accumulates them across documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChunkStats {
    pub documents_chunked: usize,
    pub total_chunks_created: usize,
    pub article_chunks: usize,
    pub note_chunks: usize,
    pub subsection_chunks: usize,
    pub chapter_title_chunks: usize,
    pub footnote_chunks: usize,
    pub oversized_chunks: usize,
    pub undersized_chunks: usize,
}

impl ChunkStats {
    pub fn absorb(&mut self, chunks: &[TextChunk], config: &ProcessingConfig) {
        self.documents_chunked += 1;
        self.total_chunks_created += chunks.len();

        for chunk in chunks {
            match chunk.chunk_type {
                ChunkType::Article => self.article_chunks += 1,
                ChunkType::Note => self.note_chunks += 1,
                ChunkType::Subsection => self.subsection_chunks += 1,
                ChunkType::ChapterTitle => self.chapter_title_chunks += 1,
                ChunkType::Footnote => self.footnote_chunks += 1,
                ChunkType::Combined => {}
            }

            if chunk.character_count > config.max_chunk_size {
                self.oversized_chunks += 1;
            } else if chunk.character_count < config.min_chunk_size {
                self.undersized_chunks += 1;
            }
        }
    }
}

/// Fixed per-type base priority plus a positional bonus that decays to
/// zero by position 50.
pub fn chunk_priority(chunk_type: ChunkType, position: usize) -> u32 {
    let base = match chunk_type {
        ChunkType::Article => 100,
        ChunkType::ChapterTitle => 90,
        ChunkType::Note => 80,
        ChunkType::Subsection => 60,
        ChunkType::Footnote => 40,
        ChunkType::Combined => 50,
    };
    base + 50u32.saturating_sub(position as u32)
}

/// Emits size-bounded chunks in structural order: chapters (title then
/// articles), standalone articles, then one combined footnote chunk.
#[derive(Debug)]
pub struct Chunker {
    normalizer: TextNormalizer,
    config: ProcessingConfig,
}

impl Chunker {
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: TextNormalizer::new()?,
            config,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn chunk_document(&self, document: &LegalDocument) -> Result<Vec<TextChunk>> {
        let mut chunks = Vec::new();
        let mut position = 0;

        for (index, chapter) in document.chapters.iter().enumerate() {
            let base_id = format!("{}_ch{index}", document.id);
            let produced = self.chunk_chapter(chapter, &document.id, position, &base_id)?;
            position += produced.len();
            chunks.extend(produced);
        }

        for (index, article) in document.standalone_articles.iter().enumerate() {
            let base_id = format!("{}_art{index}", document.id);
            let produced = self.chunk_article(article, &document.id, position, &base_id)?;
            position += produced.len();
            chunks.extend(produced);
        }

        if !document.footnotes.is_empty() {
            chunks.push(self.footnote_chunk(document, position)?);
        }

        Ok(chunks)
    }

    /// One document's failure is recorded in the report and does not stop
    /// the remaining documents.
    pub fn chunk_batch(
        &self,
        documents: &[LegalDocument],
    ) -> (Vec<TextChunk>, ChunkStats, ProcessingReport) {
        let mut report = ProcessingReport::begin("text_chunking", documents.len());
        let mut stats = ChunkStats::default();
        let mut all_chunks = Vec::new();

        for document in documents {
            match self.chunk_document(document) {
                Ok(chunks) => {
                    debug!(id = %document.id, chunks = chunks.len(), "document chunked");
                    stats.absorb(&chunks, &self.config);
                    all_chunks.extend(chunks);
                    report.processed_items += 1;
                }
                Err(error) => {
                    let message = format!("failed to chunk document {}: {error:#}", document.id);
                    warn!(id = %document.id, error = %error, "chunking failed");
                    report.errors.push(message);
                    report.failed_items += 1;
                }
            }
        }

        report.statistics.insert("chunking".to_string(), json!(stats));
        report.finish();

        (all_chunks, stats, report)
    }

    fn chunk_chapter(
        &self,
        chapter: &Chapter,
        document_id: &str,
        base_position: usize,
        base_id: &str,
    ) -> Result<Vec<TextChunk>> {
        let mut chunks = Vec::new();
        let mut counter = 0usize;

        if !chapter.title.is_empty() {
            let content = format!("{} - {}", chapter.number, chapter.title);
            let keywords = self
                .normalizer
                .extract_keywords(&content, CHILD_CHUNK_KEYWORDS);
            chunks.push(self.build_chunk(
                format!("{base_id}_{counter:03}"),
                document_id,
                content,
                ChunkType::ChapterTitle,
                base_position,
                keywords,
                vec![chapter.number.clone()],
                &chapter.number,
            )?);
            counter += 1;
        }

        for (index, article) in chapter.articles.iter().enumerate() {
            let article_base = format!("{base_id}_{counter}");
            let produced =
                self.chunk_article(article, document_id, base_position + index + 1, &article_base)?;
            counter += produced.len();
            chunks.extend(produced);
        }

        Ok(chunks)
    }

    /// Fixed order per article: main content, then subsections, then notes.
    fn chunk_article(
        &self,
        article: &Article,
        document_id: &str,
        position: usize,
        base_id: &str,
    ) -> Result<Vec<TextChunk>> {
        let mut chunks = Vec::new();
        let mut counter = 0usize;

        let main_content = if article.title.is_empty() {
            format!("{}\n\n{}", article.number, article.content)
        } else {
            format!("{} - {}\n\n{}", article.number, article.title, article.content)
        };

        for piece in self.split_long_content(&main_content) {
            chunks.push(self.build_chunk(
                format!("{base_id}_{counter:03}"),
                document_id,
                piece,
                ChunkType::Article,
                position,
                article.keywords.iter().take(ARTICLE_CHUNK_KEYWORDS).cloned().collect(),
                vec![article.number.clone()],
                &article.number,
            )?);
            counter += 1;
        }

        for (index, subsection) in article.subsections.iter().enumerate() {
            let content = format!(
                "{} - بند {}\n\n{}",
                article.number, subsection.number, subsection.content
            );
            for piece in self.split_long_content(&content) {
                chunks.push(self.build_chunk(
                    format!("{base_id}_{counter:03}"),
                    document_id,
                    piece,
                    ChunkType::Subsection,
                    position,
                    subsection
                        .keywords
                        .iter()
                        .take(CHILD_CHUNK_KEYWORDS)
                        .cloned()
                        .collect(),
                    vec![
                        article.number.clone(),
                        format!("بند {}", subsection.number),
                    ],
                    &format!("{}_subsection_{index}", article.number),
                )?);
                counter += 1;
            }
        }

        for (index, note) in article.notes.iter().enumerate() {
            let content = format!("{} - {}\n\n{}", article.number, note.number, note.content);
            for piece in self.split_long_content(&content) {
                chunks.push(self.build_chunk(
                    format!("{base_id}_{counter:03}"),
                    document_id,
                    piece,
                    ChunkType::Note,
                    position,
                    note.keywords.iter().take(CHILD_CHUNK_KEYWORDS).cloned().collect(),
                    vec![article.number.clone(), note.number.clone()],
                    &format!("{}_note_{index}", article.number),
                )?);
                counter += 1;
            }
        }

        Ok(chunks)
    }

    fn footnote_chunk(&self, document: &LegalDocument, position: usize) -> Result<TextChunk> {
        let content = document
            .footnotes
            .iter()
            .enumerate()
            .map(|(index, footnote)| format!("پاورقی {}: {footnote}", index + 1))
            .collect::<Vec<_>>()
            .join("\n\n");
        let keywords = self
            .normalizer
            .extract_keywords(&content, CHILD_CHUNK_KEYWORDS);

        self.build_chunk(
            format!("{}_footnotes", document.id),
            &document.id,
            content,
            ChunkType::Footnote,
            position,
            keywords,
            vec!["پاورقی".to_string()],
            "footnotes",
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build_chunk(
        &self,
        id: String,
        document_id: &str,
        content: String,
        chunk_type: ChunkType,
        position: usize,
        keywords: Vec<String>,
        legal_references: Vec<String>,
        source_element: &str,
    ) -> Result<TextChunk> {
        let mut metadata = BTreeMap::new();
        metadata.insert("source_element".to_string(), json!(source_element));
        metadata.insert("element_type".to_string(), json!(chunk_type.as_str()));
        metadata.insert("document_id".to_string(), json!(document_id));
        metadata.insert("position".to_string(), json!(position));
        metadata.insert(
            "priority".to_string(),
            json!(chunk_priority(chunk_type, position)),
        );
        metadata.insert("creation_time".to_string(), json!(now_utc_string()));

        TextChunk::new(
            id,
            document_id.to_string(),
            content,
            chunk_type,
            position,
            keywords,
            legal_references,
            metadata,
        )
        .with_context(|| format!("failed to build chunk for document {document_id}"))
    }

    /// Sentence-first greedy packing with a word-packing fallback.
    /// Packing targets max size minus the overlap budget, so the overlap
    /// prefix added afterwards still fits under the hard ceiling.
    fn split_long_content(&self, content: &str) -> Vec<String> {
        if content.chars().count() <= self.config.max_chunk_size {
            return vec![content.to_string()];
        }

        let target = self.packing_target();
        let sentences = self.normalizer.split_sentences(content);

        let pieces = if sentences.len() > 1 {
            let mut pieces = Vec::new();
            let mut current = String::new();

            for sentence in sentences {
                let candidate_len = if current.is_empty() {
                    sentence.chars().count()
                } else {
                    current.chars().count() + 1 + sentence.chars().count()
                };

                if candidate_len <= target {
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(&sentence);
                    continue;
                }

                if !current.is_empty() {
                    pieces.push(current.clone());
                    current.clear();
                }

                if sentence.chars().count() <= target {
                    current = sentence;
                } else {
                    let mut word_pieces = self.split_by_words(&sentence);
                    current = word_pieces.pop().unwrap_or_default();
                    pieces.extend(word_pieces);
                }
            }

            if !current.is_empty() {
                pieces.push(current);
            }
            pieces
        } else {
            self.split_by_words(content)
        };

        self.add_overlap(pieces)
    }

    fn packing_target(&self) -> usize {
        self.config
            .max_chunk_size
            .saturating_sub(self.config.chunk_overlap)
            .max(1)
    }

    fn split_by_words(&self, content: &str) -> Vec<String> {
        let target = self.packing_target();
        let mut pieces = Vec::new();
        let mut current_words: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for word in content.split_whitespace() {
            let word_len = word.chars().count() + 1;

            if current_len + word_len <= target || current_words.is_empty() {
                current_words.push(word);
                current_len += word_len;
            } else {
                pieces.push(current_words.join(" "));
                current_words = vec![word];
                current_len = word_len;
            }
        }

        if !current_words.is_empty() {
            pieces.push(current_words.join(" "));
        }

        pieces
    }

    /// Prefixes each piece after the first with the word tail of its
    /// predecessor, unless the combined length would break the ceiling.
    fn add_overlap(&self, pieces: Vec<String>) -> Vec<String> {
        let overlap_words = self.config.overlap_word_count();
        if pieces.len() <= 1 || overlap_words == 0 {
            return pieces;
        }

        let mut overlapped = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.iter().enumerate() {
            if index == 0 {
                overlapped.push(piece.clone());
                continue;
            }

            let previous_words: Vec<&str> = pieces[index - 1].split_whitespace().collect();
            let tail_start = previous_words.len().saturating_sub(overlap_words);
            let overlap_text = previous_words[tail_start..].join(" ");

            let combined_len =
                overlap_text.chars().count() + 1 + piece.chars().count();
            if !overlap_text.is_empty() && combined_len <= self.config.max_chunk_size {
                overlapped.push(format!("{overlap_text} {piece}"));
            } else {
                overlapped.push(piece.clone());
            }
        }

        overlapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentType, Note, Subsection, SubsectionKind};

    fn chunker() -> Chunker {
        Chunker::new(ProcessingConfig::default()).expect("chunker builds")
    }

    fn article(number: &str, content: &str) -> Article {
        Article::new(
            number.to_string(),
            String::new(),
            content.to_string(),
            Vec::new(),
            Vec::new(),
            vec!["قانون".to_string()],
        )
        .expect("article builds")
    }

    fn document(id: &str) -> LegalDocument {
        LegalDocument::new(
            id.to_string(),
            "قانون نمونه برای آزمون".to_string(),
            "۲۲/۱۲/۱۳۶۴".to_string(),
            "مجلس شورای اسلامی".to_string(),
            DocumentType::Law,
        )
        .expect("document builds")
    }

    #[test]
    fn long_article_is_split_with_overlap_under_the_ceiling() {
        let chunker = chunker();
        let long_content = (0..400)
            .map(|index| format!("کلمه{index}"))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(long_content.chars().count() >= 2400);

        let mut doc = document("doc_001");
        doc.standalone_articles.push(article("ماده ۱", &long_content));

        let chunks = chunker.chunk_document(&doc).expect("chunks");

        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|chunk| chunk.character_count <= 1000));

        // Every chunk after the first starts with the tail of its
        // predecessor's wording.
        for pair in chunks.windows(2) {
            let previous_words: Vec<&str> = pair[0].content.split_whitespace().collect();
            let last_word = previous_words.last().expect("words");
            assert!(pair[1].content.contains(last_word));
        }
    }

    #[test]
    fn chapter_title_precedes_articles_and_footnotes_close_the_sequence() {
        let chunker = chunker();
        let mut doc = document("doc_002");
        doc.chapters.push(Chapter {
            number: "فصل اول".to_string(),
            title: "کلیات".to_string(),
            articles: vec![article("ماده ۱", "متن ماده اول در فصل است.")],
        });
        doc.footnotes.push("توضیح پاورقی".to_string());

        let chunks = chunker.chunk_document(&doc).expect("chunks");

        assert_eq!(chunks[0].chunk_type, ChunkType::ChapterTitle);
        assert_eq!(chunks[1].chunk_type, ChunkType::Article);
        assert_eq!(
            chunks.last().expect("chunks").chunk_type,
            ChunkType::Footnote
        );
        assert!(
            chunks
                .last()
                .expect("chunks")
                .content
                .starts_with("پاورقی 1:")
        );
    }

    #[test]
    fn positions_are_non_decreasing_and_references_non_empty() {
        let chunker = chunker();
        let mut doc = document("doc_003");

        let mut first = article("ماده ۱", "متن اصلی ماده اول است.");
        first.subsections.push(
            Subsection::new(
                "الف".to_string(),
                "متن بند الف است.".to_string(),
                SubsectionKind::Lettered,
                Vec::new(),
            )
            .expect("subsection builds"),
        );
        first.notes.push(
            Note::new(
                "تبصره ۱".to_string(),
                "متن تبصره اول است.".to_string(),
                Vec::new(),
                Vec::new(),
            )
            .expect("note builds"),
        );

        doc.chapters.push(Chapter {
            number: "فصل اول".to_string(),
            title: "کلیات".to_string(),
            articles: vec![first, article("ماده ۲", "متن ماده دوم است.")],
        });
        doc.footnotes.push("پاورقی آزمایشی".to_string());

        let chunks = chunker.chunk_document(&doc).expect("chunks");

        for pair in chunks.windows(2) {
            assert!(pair[0].position <= pair[1].position);
        }
        assert!(chunks.iter().all(|chunk| !chunk.legal_references.is_empty()));
    }

    #[test]
    fn subsection_and_note_chunks_carry_their_owner_references() {
        let chunker = chunker();
        let mut doc = document("doc_004");

        let mut owner = article("ماده ۵", "متن اصلی ماده پنجم است.");
        owner.subsections.push(
            Subsection::new(
                "۲".to_string(),
                "متن بند دوم است.".to_string(),
                SubsectionKind::Numbered,
                vec!["بند".to_string()],
            )
            .expect("subsection builds"),
        );
        owner.notes.push(
            Note::new(
                "تبصره".to_string(),
                "متن تبصره است.".to_string(),
                Vec::new(),
                vec!["تبصره".to_string()],
            )
            .expect("note builds"),
        );
        doc.standalone_articles.push(owner);

        let chunks = chunker.chunk_document(&doc).expect("chunks");

        let subsection_chunk = chunks
            .iter()
            .find(|chunk| chunk.chunk_type == ChunkType::Subsection)
            .expect("subsection chunk");
        assert!(subsection_chunk.content.starts_with("ماده ۵ - بند ۲"));
        assert_eq!(
            subsection_chunk.legal_references,
            vec!["ماده ۵".to_string(), "بند ۲".to_string()]
        );

        let note_chunk = chunks
            .iter()
            .find(|chunk| chunk.chunk_type == ChunkType::Note)
            .expect("note chunk");
        assert_eq!(
            note_chunk.legal_references,
            vec!["ماده ۵".to_string(), "تبصره".to_string()]
        );
    }

    #[test]
    fn undersized_chunks_are_flagged_but_kept() {
        let chunker = chunker();
        let mut doc = document("doc_005");
        doc.standalone_articles
            .push(article("ماده ۱", "متن کوتاه."));

        let chunks = chunker.chunk_document(&doc).expect("chunks");
        let mut stats = ChunkStats::default();
        stats.absorb(&chunks, chunker.config());

        assert_eq!(chunks.len(), 1);
        assert_eq!(stats.undersized_chunks, 1);
        assert_eq!(stats.oversized_chunks, 0);
    }

    #[test]
    fn priority_prefers_articles_and_early_positions() {
        assert_eq!(chunk_priority(ChunkType::Article, 0), 150);
        assert_eq!(chunk_priority(ChunkType::Note, 10), 120);
        assert_eq!(chunk_priority(ChunkType::Subsection, 60), 60);
        assert!(
            chunk_priority(ChunkType::Article, 0) > chunk_priority(ChunkType::Article, 5)
        );
    }

    #[test]
    fn batch_report_tracks_empty_and_successful_runs() {
        let chunker = chunker();

        let (chunks, stats, report) = chunker.chunk_batch(&[]);
        assert!(chunks.is_empty());
        assert_eq!(stats, ChunkStats::default());
        assert_eq!(report.total_items, 0);
        assert_eq!(report.success_rate(), 0.0);

        let mut doc = document("doc_006");
        doc.standalone_articles
            .push(article("ماده ۱", "متن ماده نمونه است."));
        let (chunks, stats, report) = chunker.chunk_batch(std::slice::from_ref(&doc));

        assert_eq!(chunks.len(), 1);
        assert_eq!(stats.documents_chunked, 1);
        assert_eq!(report.processed_items, 1);
        assert_eq!(report.success_rate(), 100.0);
    }

    #[test]
    fn deterministic_ids_follow_the_base_and_counter_scheme() {
        let chunker = chunker();
        let mut doc = document("doc_007");
        doc.standalone_articles
            .push(article("ماده ۱", "متن ماده نمونه است."));

        let chunks = chunker.chunk_document(&doc).expect("chunks");
        assert_eq!(chunks[0].id, "doc_007_art0_000");
    }
}
