use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::boundary::{BoundaryExtractor, MarkerFamily};
use crate::config::ProcessingConfig;
use crate::model::{
    AUTHORITY_CABINET, AUTHORITY_PARLIAMENT, AUTHORITY_SUPREME_COUNCIL, LawRecord, UNKNOWN_LABEL,
};
use crate::normalize::TextNormalizer;
use crate::util::{now_utc_string, sha256_text};

/// Keywords that mark a line as a plausible document title.
const TITLE_KEYWORDS: &[&str] = &["قانون", "آیین‌نامه", "دستورالعمل"];

/// Structure indicators used by the quality score.
const STRUCTURE_INDICATORS: &[&str] = &["ماده", "تبصره", "بند", "فصل"];

const TITLE_SCAN_LINES: usize = 5;
const FALLBACK_TITLE_LINES: usize = 3;
const FALLBACK_TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SplitStats {
    pub laws_found: usize,
    pub valid_laws: usize,
    pub invalid_laws: usize,
    pub extraction_errors: usize,
}

#[derive(Debug)]
pub struct SplitOutcome {
    pub records: Vec<LawRecord>,
    pub stats: SplitStats,
    pub source_sha256: String,
}

/// Partitions the raw paragraph stream into quality-gated law records.
#[derive(Debug)]
pub struct Splitter {
    normalizer: TextNormalizer,
    boundaries: BoundaryExtractor,
    title_clause: Regex,
    date_token: Regex,
    article_marker: Regex,
    config: ProcessingConfig,
}

impl Splitter {
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        Ok(Self {
            normalizer: TextNormalizer::new()?,
            boundaries: BoundaryExtractor::new()?,
            title_clause: Regex::new(r"^(.+?)\s*\(\s*مصوب\s+([^)]+)\)")
                .context("failed to compile title clause regex")?,
            date_token: Regex::new(
                r"(\d{1,2}/\d{1,2}/\d{4}|\d{1,2}/\d{1,2}/\d{2}|[۰-۹]{1,2}/[۰-۹]{1,2}/[۰-۹]{4}|[۰-۹]{1,2}/[۰-۹]{1,2}/[۰-۹]{2})",
            )
            .context("failed to compile date token regex")?,
            article_marker: Regex::new(r"ماده\s*[0-9۰-۹]+|ماده\s*واحده")
                .context("failed to compile article marker regex")?,
            config,
        })
    }

    /// Joins the paragraph stream, cuts it at law separators, and keeps
    /// every record that clears the quality threshold. A failure on one
    /// record is counted and skipped, never aborting the batch.
    pub fn split(&self, paragraphs: &[String]) -> SplitOutcome {
        let full_text = paragraphs
            .iter()
            .map(|paragraph| paragraph.trim())
            .filter(|paragraph| !paragraph.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let source_sha256 = sha256_text(&full_text);

        let spans = self
            .boundaries
            .find_boundaries(&full_text, MarkerFamily::LawSeparator);

        let mut stats = SplitStats {
            laws_found: spans.len(),
            ..SplitStats::default()
        };
        let mut records = Vec::new();

        for (index, span) in spans.iter().enumerate() {
            let law_text = span.span(&full_text).trim();
            if law_text.is_empty() {
                stats.invalid_laws += 1;
                continue;
            }

            match self.process_record(law_text, index) {
                Ok(Some(record)) if record.quality_score >= self.config.quality_threshold => {
                    debug!(id = %record.id, score = record.quality_score, "law record accepted");
                    stats.valid_laws += 1;
                    records.push(record);
                }
                Ok(_) => {
                    debug!(index = index + 1, "law record below quality threshold");
                    stats.invalid_laws += 1;
                }
                Err(error) => {
                    warn!(index = index + 1, error = %error, "law record extraction failed");
                    stats.extraction_errors += 1;
                }
            }
        }

        SplitOutcome {
            records,
            stats,
            source_sha256,
        }
    }

    fn process_record(&self, law_text: &str, index: usize) -> Result<Option<LawRecord>> {
        let cleaned = self.normalizer.clean(law_text);
        if cleaned.chars().count() < self.config.min_law_length {
            return Ok(None);
        }

        let (title, approval_date, approval_authority) =
            self.extract_title_and_date(&cleaned, index);
        let quality_score = self.quality_score(&cleaned, &title);

        Ok(Some(LawRecord {
            id: format!("law_{:03}", index + 1),
            title,
            approval_date,
            approval_authority,
            word_count: cleaned.split_whitespace().count(),
            raw_content: cleaned,
            extraction_timestamp: now_utc_string(),
            quality_score,
        }))
    }

    /// Looks for the `<title> (مصوب <date clause>)` form in the leading
    /// lines; otherwise falls back to the first title-like line, and
    /// finally to a synthesized title.
    fn extract_title_and_date(&self, cleaned: &str, index: usize) -> (String, String, String) {
        let head = cleaned
            .lines()
            .take(TITLE_SCAN_LINES)
            .collect::<Vec<_>>()
            .join(" ");

        if let Some(captures) = self.title_clause.captures(&head) {
            let title = captures[1].trim().to_string();
            let date_clause = captures[2].trim();

            let authority = if date_clause.contains("هیئت‌وزیران")
                || date_clause.contains("هیئت وزیران")
            {
                AUTHORITY_CABINET
            } else if date_clause.contains("شورای") {
                AUTHORITY_SUPREME_COUNCIL
            } else {
                AUTHORITY_PARLIAMENT
            };

            let approval_date = self
                .date_token
                .find(date_clause)
                .map_or_else(|| date_clause.to_string(), |found| found.as_str().to_string());

            return (title, approval_date, authority.to_string());
        }

        for line in cleaned
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(FALLBACK_TITLE_LINES)
        {
            let line = line.trim();
            if TITLE_KEYWORDS.iter().any(|keyword| line.contains(keyword)) {
                return (
                    truncate_chars(line, FALLBACK_TITLE_MAX_CHARS),
                    UNKNOWN_LABEL.to_string(),
                    UNKNOWN_LABEL.to_string(),
                );
            }
        }

        (
            format!("سند حقوقی شماره {}", index + 1),
            UNKNOWN_LABEL.to_string(),
            UNKNOWN_LABEL.to_string(),
        )
    }

    /// Five independent checks, 0.2 each: minimum length, meaningful
    /// title, Persian content, structure indicators, article markers.
    fn quality_score(&self, cleaned: &str, title: &str) -> f64 {
        let mut score = 0.0;

        if cleaned.chars().count() >= self.config.min_law_length {
            score += 0.2;
        }
        if title.chars().count() > 10 {
            score += 0.2;
        }
        if self.normalizer.is_valid_persian_text(cleaned) {
            score += 0.2;
        }

        let indicator_count = STRUCTURE_INDICATORS
            .iter()
            .filter(|indicator| cleaned.contains(**indicator))
            .count();
        if indicator_count >= 2 {
            score += 0.2;
        }

        if self.article_marker.is_match(cleaned) {
            score += 0.2;
        }

        f64::min(score, 1.0)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> Splitter {
        Splitter::new(ProcessingConfig::default()).expect("splitter builds")
    }

    fn sample_law(ordinal: &str) -> Vec<String> {
        vec![
            format!("قانون مقررات انتظامی هیئت علمی {ordinal} (مصوب ۲۲/۱۲/۱۳۶۴)"),
            "ماده ۱ - اعضای هیئت علمی دانشگاه‌ها موظف به رعایت مقررات این قانون هستند.".to_string(),
            "تبصره - این ماده شامل تمام اعضای هیئت علمی می‌شود.".to_string(),
        ]
    }

    #[test]
    fn two_separated_laws_become_two_records() {
        let splitter = splitter();
        let mut paragraphs = sample_law("اول");
        paragraphs.push("************".to_string());
        paragraphs.extend(sample_law("دوم"));

        let outcome = splitter.split(&paragraphs);

        assert_eq!(outcome.stats.laws_found, 2);
        assert_eq!(outcome.stats.valid_laws, 2);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].id, "law_001");
        assert_eq!(outcome.records[1].id, "law_002");
        assert!(outcome.records[0].title.contains("قانون مقررات انتظامی"));
    }

    #[test]
    fn title_date_and_authority_come_from_the_approval_clause() {
        let splitter = splitter();
        let outcome = splitter.split(&sample_law("نمونه"));

        let record = &outcome.records[0];
        assert_eq!(record.approval_date, "۲۲/۱۲/۱۳۶۴");
        assert_eq!(record.approval_authority, AUTHORITY_PARLIAMENT);
        assert!(!record.title.contains("مصوب"));
    }

    #[test]
    fn cabinet_clause_overrides_the_default_authority() {
        let splitter = splitter();
        let paragraphs = vec![
            "آیین‌نامه اجرایی نمونه (مصوب هیئت وزیران ۱/۲/۱۳۷۰)".to_string(),
            "ماده ۱ - این آیین‌نامه برای تمام دستگاه‌های اجرایی لازم‌الاجرا است.".to_string(),
            "تبصره - موارد استثنا را هیئت‌وزیران تعیین می‌کند.".to_string(),
        ];

        let outcome = splitter.split(&paragraphs);
        assert_eq!(outcome.records[0].approval_authority, AUTHORITY_CABINET);
        assert_eq!(outcome.records[0].approval_date, "۱/۲/۱۳۷۰");
    }

    #[test]
    fn short_segments_are_counted_invalid() {
        let splitter = splitter();
        let paragraphs = vec!["متن کوتاه".to_string()];

        let outcome = splitter.split(&paragraphs);
        assert_eq!(outcome.stats.laws_found, 1);
        assert_eq!(outcome.stats.invalid_laws, 1);
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn empty_input_yields_no_records_without_error() {
        let splitter = splitter();
        let outcome = splitter.split(&[]);

        assert_eq!(outcome.stats, SplitStats::default());
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn no_record_ever_falls_below_the_quality_gate() {
        let splitter = splitter();
        let mut paragraphs = sample_law("اول");
        paragraphs.push("************".to_string());
        paragraphs.push("چند کلمه".to_string());

        let outcome = splitter.split(&paragraphs);
        assert!(
            outcome
                .records
                .iter()
                .all(|record| record.quality_score >= 0.4)
        );
        assert_eq!(outcome.stats.invalid_laws, 1);
    }

    #[test]
    fn missing_title_falls_back_to_a_synthesized_one() {
        let splitter = splitter();
        let paragraphs = vec![
            "متن بدون عنوان مشخص ولی به اندازه کافی طولانی برای بررسی".to_string(),
            "ماده ۱ - حکم اول این متن که باید استخراج شود.".to_string(),
            "تبصره - توضیح تکمیلی برای حکم بالا.".to_string(),
        ];

        let outcome = splitter.split(&paragraphs);
        let record = &outcome.records[0];
        assert_eq!(record.title, "سند حقوقی شماره 1");
        assert_eq!(record.approval_date, UNKNOWN_LABEL);
    }
}
