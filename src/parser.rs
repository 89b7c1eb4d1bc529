use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::boundary::{Boundary, BoundaryExtractor, MarkerFamily};
use crate::model::{
    Article, Chapter, DocumentType, LawRecord, LegalDocument, Note, Subsection, SubsectionKind,
};
use crate::normalize::TextNormalizer;

const ARTICLE_KEYWORDS: usize = 10;
const CHILD_KEYWORDS: usize = 5;

/// Header text at most this long, without sentence punctuation and with a
/// body following it, is treated as an article title rather than as the
/// opening of the article content.
const MAX_TITLE_CHARS: usize = 60;

/// Counters accumulated by the batch loop across parsed documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ParseStats {
    pub documents_parsed: usize,
    pub chapters_found: usize,
    pub articles_extracted: usize,
    pub notes_extracted: usize,
    pub parsing_errors: usize,
}

impl ParseStats {
    pub fn absorb(&mut self, document: &LegalDocument) {
        self.documents_parsed += 1;
        self.chapters_found += document.chapters.len();
        self.articles_extracted += document.total_articles();
        self.notes_extracted += document
            .articles()
            .map(|article| article.notes.len())
            .sum::<usize>();
    }
}

/// Recursive-descent decomposition of one law record into its
/// chapter/article/note/subsection tree, driven by the boundary extractor
/// at each nesting level.
#[derive(Debug)]
pub struct StructureParser {
    normalizer: TextNormalizer,
    boundaries: BoundaryExtractor,
    subsection_numbered: Regex,
    subsection_lettered: Regex,
    subsection_dash: Regex,
    footnote_marker: Regex,
}

impl StructureParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            normalizer: TextNormalizer::new()?,
            boundaries: BoundaryExtractor::new()?,
            subsection_numbered: Regex::new(r"(?m)^\s*([0-9۰-۹]+)\s*[-–—]\s*")
                .context("failed to compile numbered subsection regex")?,
            subsection_lettered: Regex::new(r"(?m)^\s*([ا-ی]{1,3})\s*[-–—]\s*")
                .context("failed to compile lettered subsection regex")?,
            subsection_dash: Regex::new(r"(?m)^\s*[-–—]\s+")
                .context("failed to compile dash subsection regex")?,
            footnote_marker: Regex::new(r"(?m)^\((\d+)\)")
                .context("failed to compile footnote marker regex")?,
        })
    }

    pub fn parse(&self, record: &LawRecord) -> Result<LegalDocument> {
        let text = record.raw_content.as_str();
        if text.trim().is_empty() {
            bail!("law record {} has no raw content", record.id);
        }

        let mut document = LegalDocument::new(
            record.id.clone(),
            record.title.clone(),
            record.approval_date.clone(),
            record.approval_authority.clone(),
            DocumentType::from_title(&record.title),
        )
        .with_context(|| format!("failed to build document for {}", record.id))?;

        for chapter_span in self
            .boundaries
            .find_boundaries(text, MarkerFamily::Chapter)
        {
            if chapter_span.is_preamble() {
                continue;
            }
            let chapter = self
                .parse_chapter(text, &chapter_span)
                .with_context(|| format!("failed to parse chapter in {}", record.id))?;
            document.chapters.push(chapter);
        }

        if document.chapters.is_empty() {
            document.standalone_articles = self
                .parse_articles(text)
                .with_context(|| format!("failed to parse articles in {}", record.id))?;
        }

        document.footnotes = self.extract_footnotes(text);

        let complexity =
            complexity_score(&document.chapters, &document.standalone_articles);
        document.metadata.word_count = text.split_whitespace().count();
        document.metadata.character_count = text.chars().count();
        document.metadata.structure_type = if document.chapters.is_empty() {
            "بدون فصل".to_string()
        } else {
            "با فصل".to_string()
        };
        document.metadata.has_footnotes = !document.footnotes.is_empty();
        document.metadata.complexity_score = complexity;
        document.metadata.quality_score = record.quality_score;
        document.raw_content = Some(text.to_string());

        Ok(document)
    }

    fn parse_chapter(&self, text: &str, span: &Boundary) -> Result<Chapter> {
        Ok(Chapter {
            number: span.label.clone(),
            title: span.title.clone(),
            articles: self.parse_articles(span.body(text))?,
        })
    }

    fn parse_articles(&self, scope: &str) -> Result<Vec<Article>> {
        let mut articles = Vec::new();

        for span in self.boundaries.find_boundaries(scope, MarkerFamily::Article) {
            if span.is_preamble() {
                continue;
            }
            articles.push(self.parse_article(scope, &span)?);
        }

        Ok(articles)
    }

    /// Decomposes one article span. Notes are cut out of the interior
    /// first; subsections come from the article's own text before the
    /// first note, so each structural element is owned exactly once.
    fn parse_article(&self, scope: &str, span: &Boundary) -> Result<Article> {
        let (title, leading) = split_header_text(&span.title, span.body(scope));
        let interior = if leading.is_empty() {
            span.body(scope).trim().to_string()
        } else {
            format!("{leading}\n{}", span.body(scope).trim())
        };

        let note_spans = self
            .boundaries
            .find_boundaries(&interior, MarkerFamily::Note);
        let own_text_end = note_spans
            .iter()
            .find(|note| !note.is_preamble())
            .map_or(interior.len(), |note| note.start);
        let own_text = &interior[..own_text_end];

        let subsections = self.extract_subsections(own_text)?;
        let notes = self.extract_notes(&interior, &note_spans)?;

        let mut main_content = own_text.to_string();
        for subsection in &subsections {
            main_content = main_content.replace(&subsection.content, "");
        }
        let main_content = main_content
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let keywords = self.normalizer.extract_keywords(&interior, ARTICLE_KEYWORDS);

        Article::new(
            span.label.clone(),
            title,
            main_content,
            subsections,
            notes,
            keywords,
        )
    }

    /// Tries the three marker kinds in order; each consumes text up to the
    /// next marker of the same kind. Results are sorted back into document
    /// order by marker offset.
    fn extract_subsections(&self, scope: &str) -> Result<Vec<Subsection>> {
        let mut found: Vec<(usize, Subsection)> = Vec::new();

        let kinds: [(&Regex, SubsectionKind); 3] = [
            (&self.subsection_numbered, SubsectionKind::Numbered),
            (&self.subsection_lettered, SubsectionKind::Lettered),
            (&self.subsection_dash, SubsectionKind::Dash),
        ];

        for (pattern, kind) in kinds {
            let markers: Vec<(usize, usize, String)> = pattern
                .captures_iter(scope)
                .map(|captures| {
                    let whole = captures.get(0).expect("match has a full capture");
                    let label = captures
                        .get(1)
                        .map_or("-".to_string(), |group| group.as_str().to_string());
                    (whole.start(), whole.end(), label)
                })
                .collect();

            for (index, (start, content_start, label)) in markers.iter().enumerate() {
                let content_end = markers
                    .get(index + 1)
                    .map_or(scope.len(), |next| next.0);
                let content = scope[*content_start..content_end].trim();
                if content.is_empty() {
                    continue;
                }

                let keywords = self.normalizer.extract_keywords(content, CHILD_KEYWORDS);
                found.push((
                    *start,
                    Subsection::new(label.clone(), content.to_string(), kind, keywords)?,
                ));
            }
        }

        found.sort_by_key(|(offset, _)| *offset);
        Ok(found.into_iter().map(|(_, subsection)| subsection).collect())
    }

    fn extract_notes(&self, interior: &str, note_spans: &[Boundary]) -> Result<Vec<Note>> {
        let mut notes = Vec::new();

        for span in note_spans {
            if span.is_preamble() {
                continue;
            }

            let body = span.body(interior).trim();
            let content = if span.title.is_empty() {
                body.to_string()
            } else if body.is_empty() {
                span.title.clone()
            } else {
                format!("{}\n{body}", span.title)
            };
            if content.trim().is_empty() {
                continue;
            }

            let subsections = self.extract_subsections(&content)?;
            let keywords = self.normalizer.extract_keywords(&content, CHILD_KEYWORDS);
            notes.push(Note::new(span.label.clone(), content, subsections, keywords)?);
        }

        Ok(notes)
    }

    /// Footnotes are parenthesized-number spans running to the next such
    /// marker; the marker itself is not part of the footnote text.
    fn extract_footnotes(&self, text: &str) -> Vec<String> {
        let markers: Vec<(usize, usize)> = self
            .footnote_marker
            .find_iter(text)
            .map(|found| (found.start(), found.end()))
            .collect();

        let mut footnotes = Vec::new();
        for (index, (_, content_start)) in markers.iter().enumerate() {
            let content_end = markers.get(index + 1).map_or(text.len(), |next| next.0);
            let content = text[*content_start..content_end].trim();
            if !content.is_empty() {
                footnotes.push(content.to_string());
            }
        }

        footnotes
    }
}

/// Splits an article header's trailing text into (title, leading content).
/// Short, punctuation-free text followed by a body reads as a title;
/// anything else opens the content.
fn split_header_text(trailing: &str, body: &str) -> (String, String) {
    let trailing = trailing.trim();
    if trailing.is_empty() {
        return (String::new(), String::new());
    }

    let looks_like_title = !body.trim().is_empty()
        && trailing.chars().count() <= MAX_TITLE_CHARS
        && !trailing.contains(['.', '؟', '!', '؛', '،', ':']);

    if looks_like_title {
        (trailing.to_string(), String::new())
    } else {
        (String::new(), trailing.to_string())
    }
}

fn complexity_score(chapters: &[Chapter], standalone: &[Article]) -> f64 {
    let mut score = 0.0;

    if !chapters.is_empty() {
        score += 0.3;
        score += f64::min(chapters.len() as f64 * 0.1, 0.2);
    }

    let chapter_articles: usize = chapters.iter().map(Chapter::article_count).sum();
    let total_articles = chapter_articles + standalone.len();
    score += f64::min(total_articles as f64 * 0.05, 0.3);

    let all_articles = chapters
        .iter()
        .flat_map(|chapter| chapter.articles.iter())
        .chain(standalone.iter());
    let mut total_subsections = 0;
    let mut total_notes = 0;
    for article in all_articles {
        total_subsections += article.subsections.len();
        total_notes += article.notes.len();
    }

    score += f64::min(total_subsections as f64 * 0.02, 0.1);
    score += f64::min(total_notes as f64 * 0.03, 0.1);

    f64::min(score, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::now_utc_string;

    fn parser() -> StructureParser {
        StructureParser::new().expect("parser builds")
    }

    fn record(text: &str) -> LawRecord {
        LawRecord {
            id: "law_001".to_string(),
            title: "قانون نمونه برای آزمون".to_string(),
            approval_date: "۲۲/۱۲/۱۳۶۴".to_string(),
            approval_authority: "مجلس شورای اسلامی".to_string(),
            raw_content: text.to_string(),
            word_count: text.split_whitespace().count(),
            extraction_timestamp: now_utc_string(),
            quality_score: 0.8,
        }
    }

    #[test]
    fn short_single_article_becomes_standalone() {
        let parser = parser();
        let document = parser
            .parse(&record("ماده ۱ - این یک متن کوتاه است."))
            .expect("parses");

        assert!(document.chapters.is_empty());
        assert_eq!(document.standalone_articles.len(), 1);

        let article = &document.standalone_articles[0];
        assert_eq!(article.number, "ماده ۱");
        assert_eq!(article.content, "این یک متن کوتاه است.");
        assert!(article.title.is_empty());
        assert_eq!(document.metadata.structure_type, "بدون فصل");
    }

    #[test]
    fn chapters_own_their_articles() {
        let parser = parser();
        let text = "فصل اول - کلیات\nماده ۱ - تعریف اول در این قانون.\nماده ۲ - تعریف دوم در این قانون.\nفصل دوم - تخلفات\nماده ۳ - حکم سوم در این قانون.";
        let document = parser.parse(&record(text)).expect("parses");

        assert_eq!(document.chapters.len(), 2);
        assert!(document.standalone_articles.is_empty());
        assert_eq!(document.chapters[0].number, "فصل اول");
        assert_eq!(document.chapters[0].title, "کلیات");
        assert_eq!(document.chapters[0].article_count(), 2);
        assert_eq!(document.chapters[1].article_count(), 1);

        let chapter_sum: usize = document
            .chapters
            .iter()
            .map(Chapter::article_count)
            .sum();
        assert_eq!(
            document.total_articles(),
            chapter_sum + document.standalone_articles.len()
        );
    }

    #[test]
    fn short_header_text_with_body_reads_as_title() {
        let parser = parser();
        let text = "ماده ۱ - تعاریف\nدر این قانون کلمات در معانی مشروح به کار می‌روند.";
        let document = parser.parse(&record(text)).expect("parses");

        let article = &document.standalone_articles[0];
        assert_eq!(article.title, "تعاریف");
        assert!(article.content.starts_with("در این قانون"));
    }

    #[test]
    fn notes_are_cut_out_of_article_content() {
        let parser = parser();
        let text = "ماده ۱ - متن اصلی ماده است.\nتبصره ۱ - توضیح اول برای ماده.\nتبصره ۲ - توضیح دوم برای ماده.";
        let document = parser.parse(&record(text)).expect("parses");

        let article = &document.standalone_articles[0];
        assert_eq!(article.notes.len(), 2);
        assert_eq!(article.notes[0].number, "تبصره ۱");
        assert!(article.notes[0].content.contains("توضیح اول"));
        assert_eq!(article.content, "متن اصلی ماده است.");
        assert!(!article.content.contains("تبصره"));
    }

    #[test]
    fn single_line_notes_keep_their_text() {
        let parser = parser();
        let text = "ماده ۱ - متن اصلی ماده است.\nتبصره - این ماده شامل تمام اعضا می‌شود.";
        let document = parser.parse(&record(text)).expect("parses");

        let note = &document.standalone_articles[0].notes[0];
        assert_eq!(note.content, "این ماده شامل تمام اعضا می‌شود.");
    }

    #[test]
    fn subsections_keep_document_order_across_kinds() {
        let parser = parser();
        let text = "ماده ۱ - موارد زیر تعیین می‌شود:\nالف - مورد حرفی اول است.\n۱ - مورد عددی اول است.\nب - مورد حرفی دوم است.";
        let document = parser.parse(&record(text)).expect("parses");

        let article = &document.standalone_articles[0];
        let labels: Vec<&str> = article
            .subsections
            .iter()
            .map(|subsection| subsection.number.as_str())
            .collect();
        assert_eq!(labels, vec!["الف", "۱", "ب"]);
        assert_eq!(article.subsections[0].kind, SubsectionKind::Lettered);
        assert_eq!(article.subsections[1].kind, SubsectionKind::Numbered);
    }

    #[test]
    fn subsection_content_is_removed_from_main_content() {
        let parser = parser();
        let text = "ماده ۱ - موارد ممنوع:\nالف - استفاده غیرمجاز از اموال عمومی.";
        let document = parser.parse(&record(text)).expect("parses");

        let article = &document.standalone_articles[0];
        assert_eq!(article.subsections.len(), 1);
        assert!(!article.content.contains("استفاده غیرمجاز"));
        assert!(article.content.contains("موارد ممنوع"));
    }

    #[test]
    fn notes_inside_articles_may_carry_subsections() {
        let parser = parser();
        let text = "ماده ۱ - متن اصلی.\nتبصره - موارد استثنا:\nالف - استثنای اول که جداگانه می‌آید.\nب - استثنای دوم که جداگانه می‌آید.";
        let document = parser.parse(&record(text)).expect("parses");

        let note = &document.standalone_articles[0].notes[0];
        assert_eq!(note.subsections.len(), 2);
        assert_eq!(note.subsections[0].number, "الف");
    }

    #[test]
    fn footnotes_run_to_the_next_marker() {
        let parser = parser();
        let text = "ماده ۱ - متن ماده است.\n(1) توضیح پاورقی اول\n(2) توضیح پاورقی دوم";
        let document = parser.parse(&record(text)).expect("parses");

        assert_eq!(document.footnotes.len(), 2);
        assert_eq!(document.footnotes[0], "توضیح پاورقی اول");
        assert!(document.metadata.has_footnotes);
    }

    #[test]
    fn empty_raw_content_fails_the_parse() {
        let parser = parser();
        assert!(parser.parse(&record("   ")).is_err());
    }

    #[test]
    fn complexity_grows_with_structure() {
        let parser = parser();
        let flat = parser
            .parse(&record("ماده ۱ - متن کوتاه ماده."))
            .expect("parses");
        let structured = parser
            .parse(&record(
                "فصل اول - کلیات\nماده ۱ - متن اول.\nتبصره - توضیح ماده.\nماده ۲ - متن دوم.",
            ))
            .expect("parses");

        assert!(
            structured.metadata.complexity_score > flat.metadata.complexity_score
        );
        assert!(structured.metadata.complexity_score <= 1.0);
    }

    #[test]
    fn parse_stats_absorb_document_counts() {
        let parser = parser();
        let document = parser
            .parse(&record(
                "فصل اول - کلیات\nماده ۱ - متن اول.\nتبصره - توضیح ماده.",
            ))
            .expect("parses");

        let mut stats = ParseStats::default();
        stats.absorb(&document);

        assert_eq!(stats.documents_parsed, 1);
        assert_eq!(stats.chapters_found, 1);
        assert_eq!(stats.articles_extracted, 1);
        assert_eq!(stats.notes_extracted, 1);
    }
}
