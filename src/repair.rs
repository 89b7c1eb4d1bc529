use anyhow::{Context, Result};
use regex::Regex;

use crate::normalize::TextNormalizer;

/// Known mojibake sequences from Persian text that went through a
/// Latin-1 round trip. Multi-byte sequences are listed before the bare
/// prefix so the prefix rule cannot shadow them.
const ENCODING_FIXES: &[(&str, &str)] = &[
    ("Ø§", "ا"),
    ("Ù†", "ن"),
    ("Ù…", "م"),
    ("Ø±", "ر"),
    ("Ø¯", "د"),
    ("Ø³", "س"),
    ("Øª", "ت"),
    ("Ø¹", "ع"),
    ("Ù„", "ل"),
    ("Ú©", "ک"),
    ("Ø­", "ح"),
    ("Ø®", "خ"),
    ("Ø¬", "ج"),
    ("Ø²", "ز"),
    ("Ø¶", "ض"),
    ("Ø·", "ط"),
    ("Ø¸", "ظ"),
    ("Ø¨", "ب"),
    ("Ù¾", "پ"),
    ("Ù‚", "ق"),
    ("Ú¯", "گ"),
    ("Ù‡", "ه"),
    ("Ø¤", "و"),
    ("Ø¦", "ی"),
    ("Ù", "ف"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RepairStats {
    pub encoding_fixes: usize,
    pub artifact_lines_removed: usize,
    pub duplicate_lines_removed: usize,
    pub header_breaks_inserted: usize,
}

impl RepairStats {
    pub fn merge(&mut self, other: RepairStats) {
        self.encoding_fixes += other.encoding_fixes;
        self.artifact_lines_removed += other.artifact_lines_removed;
        self.duplicate_lines_removed += other.duplicate_lines_removed;
        self.header_breaks_inserted += other.header_breaks_inserted;
    }
}

/// Secondary cleanup stage applied to each law record before structure
/// parsing: encoding repair, artifact removal, formatting and terminology
/// standardization, duplicate removal, and structural break insertion.
#[derive(Debug)]
pub struct TextRepairer {
    normalizer: TextNormalizer,
    separator_runs: Regex,
    artifact_lines: Vec<Regex>,
    approval_clause: Regex,
    article_spacing: Regex,
    note_spacing: Regex,
    chapter_spacing: Regex,
    cabinet_variants: Regex,
    parliament_spacing: Regex,
    date_spacing: Regex,
    inline_headers: Regex,
}

impl TextRepairer {
    pub fn new() -> Result<Self> {
        let artifact_patterns = [
            r"^\s*صفحه\s*[0-9۰-۹]+\s*$",
            r"^\s*Page\s*\d+\s*$",
            r"^\s*[0-9۰-۹]+\s*/\s*[0-9۰-۹]+\s*$",
            r"^\s*\.{3,}\s*$",
            r"^\s*_{3,}\s*$",
        ];
        let artifact_lines = artifact_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("failed to compile artifact pattern: {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            normalizer: TextNormalizer::new()?,
            separator_runs: Regex::new(r"\*{10,}|={10,}|-{10,}")
                .context("failed to compile separator run regex")?,
            artifact_lines,
            approval_clause: Regex::new(r"\s*\(\s*مصوب\s+")
                .context("failed to compile approval clause regex")?,
            article_spacing: Regex::new(r"ماده\s*([0-9۰-۹]+|واحده)")
                .context("failed to compile article spacing regex")?,
            note_spacing: Regex::new(r"تبصره\s*([0-9۰-۹]+)")
                .context("failed to compile note spacing regex")?,
            chapter_spacing: Regex::new(r"فصل\s*(\w+)")
                .context("failed to compile chapter spacing regex")?,
            cabinet_variants: Regex::new(r"هی[ائ]ت[\s‌]*وزیران")
                .context("failed to compile cabinet variant regex")?,
            parliament_spacing: Regex::new(r"مجلس\s+شورای\s+اسلامی")
                .context("failed to compile parliament spacing regex")?,
            date_spacing: Regex::new(r"([0-9۰-۹]{1,2})\s*/\s*([0-9۰-۹]{1,2})\s*/\s*([0-9۰-۹]{2,4})")
                .context("failed to compile date spacing regex")?,
            inline_headers: Regex::new(
                r"(?:ماده\s*(?:[0-9۰-۹]+|واحده)|تبصره\s*[0-9۰-۹]*|فصل\s+\S+)\s*[-–—:]",
            )
            .context("failed to compile inline header regex")?,
        })
    }

    pub fn repair(&self, text: &str) -> (String, RepairStats) {
        let mut stats = RepairStats::default();
        if text.is_empty() {
            return (String::new(), stats);
        }

        let repaired = self.fix_encoding(text, &mut stats);
        let repaired = self.remove_artifacts(&repaired, &mut stats);
        let repaired = self.fix_formatting(&repaired);
        let repaired = self.normalizer.normalize(&repaired);
        let repaired = self.remove_duplicate_lines(&repaired, &mut stats);
        let repaired = self.insert_header_breaks(&repaired, &mut stats);
        let repaired = self.normalizer.clean(&repaired);

        (repaired, stats)
    }

    fn fix_encoding(&self, text: &str, stats: &mut RepairStats) -> String {
        let mut fixed = text.to_string();
        for (broken, correct) in ENCODING_FIXES {
            let occurrences = fixed.matches(broken).count();
            if occurrences > 0 {
                fixed = fixed.replace(broken, correct);
                stats.encoding_fixes += occurrences;
            }
        }
        fixed
    }

    fn remove_artifacts(&self, text: &str, stats: &mut RepairStats) -> String {
        let without_separators = self.separator_runs.replace_all(text, "");

        let mut kept = Vec::new();
        for line in without_separators.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if self
                .artifact_lines
                .iter()
                .any(|pattern| pattern.is_match(trimmed))
            {
                stats.artifact_lines_removed += 1;
                continue;
            }
            kept.push(trimmed.to_string());
        }

        kept.join("\n")
    }

    fn fix_formatting(&self, text: &str) -> String {
        let fixed = self.approval_clause.replace_all(text, " (مصوب ");
        let fixed = self.article_spacing.replace_all(&fixed, "ماده $1");
        let fixed = self.note_spacing.replace_all(&fixed, "تبصره $1");
        let fixed = self.chapter_spacing.replace_all(&fixed, "فصل $1");
        let fixed = self.cabinet_variants.replace_all(&fixed, "هیئت‌وزیران");
        let fixed = self
            .parliament_spacing
            .replace_all(&fixed, "مجلس شورای اسلامی");
        self.date_spacing.replace_all(&fixed, "$1/$2/$3").into_owned()
    }

    fn remove_duplicate_lines(&self, text: &str, stats: &mut RepairStats) -> String {
        let mut seen = std::collections::HashSet::new();
        let mut kept = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                kept.push(trimmed.to_string());
            } else {
                stats.duplicate_lines_removed += 1;
            }
        }

        kept.join("\n")
    }

    /// Breaks structural headers (ماده/تبصره/فصل followed by their dash or
    /// colon) out of the middle of a line. Bare cross-references like
    /// "طبق ماده ۵" carry no dash and are left alone.
    fn insert_header_breaks(&self, text: &str, stats: &mut RepairStats) -> String {
        let mut output = String::with_capacity(text.len());
        let mut last_end = 0;

        for found in self.inline_headers.find_iter(text) {
            output.push_str(&text[last_end..found.start()]);

            let at_line_start = output.is_empty() || output.trim_end_matches(' ').ends_with('\n');
            if !at_line_start {
                while output.ends_with(' ') {
                    output.pop();
                }
                output.push('\n');
                stats.header_breaks_inserted += 1;
            }

            output.push_str(found.as_str());
            last_end = found.end();
        }

        output.push_str(&text[last_end..]);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repairer() -> TextRepairer {
        TextRepairer::new().expect("patterns compile")
    }

    #[test]
    fn repair_fixes_mojibake_sequences() {
        let repairer = repairer();
        let (repaired, stats) = repairer.repair("Ù…Ø§Ø¯Ù‡ نمونه");
        assert!(repaired.starts_with("ماده"));
        assert!(stats.encoding_fixes > 0);
    }

    #[test]
    fn repair_drops_artifact_lines_and_separators() {
        let repairer = repairer();
        let input = "قانون نمونه برای آزمون\nصفحه ۱۲\n............\n۳ / ۴\n**************\nمتن اصلی ماده";
        let (repaired, stats) = repairer.repair(input);

        assert!(!repaired.contains("صفحه"));
        assert!(!repaired.contains('*'));
        assert!(!repaired.contains("...."));
        assert!(repaired.contains("متن اصلی ماده"));
        assert_eq!(stats.artifact_lines_removed, 3);
    }

    #[test]
    fn repair_standardizes_marker_spacing() {
        let repairer = repairer();
        let (repaired, _) = repairer.repair("ماده1 - متن\nتبصره2 - توضیح");
        assert!(repaired.contains("ماده 1"));
        assert!(repaired.contains("تبصره 2"));
    }

    #[test]
    fn repair_unifies_cabinet_spelling() {
        let repairer = repairer();
        let (repaired, _) = repairer.repair("مصوب هیات وزیران در جلسه");
        assert!(repaired.contains("هیئت‌وزیران"));
    }

    #[test]
    fn repair_despaces_dates() {
        let repairer = repairer();
        let (repaired, _) = repairer.repair("قانون نمونه (مصوب ۲۲ / ۱۲ / ۱۳۶۴)");
        assert!(repaired.contains("۲۲/۱۲/۱۳۶۴"));
    }

    #[test]
    fn repair_removes_repeated_lines() {
        let repairer = repairer();
        let input = "ماده 1 - متن تکراری\nماده 1 - متن تکراری\nماده 2 - متن تازه";
        let (repaired, stats) = repairer.repair(input);

        assert_eq!(repaired.matches("متن تکراری").count(), 1);
        assert_eq!(stats.duplicate_lines_removed, 1);
    }

    #[test]
    fn repair_breaks_inline_headers_onto_new_lines() {
        let repairer = repairer();
        let input = "مقدمه قانون است. ماده 1 - متن ماده طبق ماده 5 قانون قبلی";
        let (repaired, stats) = repairer.repair(input);

        let lines: Vec<&str> = repaired.lines().collect();
        assert_eq!(stats.header_breaks_inserted, 1);
        assert!(lines.iter().any(|line| line.starts_with("ماده 1")));
        // The bare cross-reference must stay inline.
        assert!(repaired.contains("طبق ماده 5 قانون"));
    }
}
