use anyhow::{Context, Result};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Ordered substitution table unifying Arabic forms to canonical Persian
/// ones. Only genuinely equivalent glyphs are mapped; letters that carry
/// meaning in Persian (آ, ئ, ؤ) are left untouched so the keyword and
/// authority tables keep matching after normalization.
const CHAR_SUBSTITUTIONS: &[(char, char)] = &[
    ('ك', 'ک'),
    ('ي', 'ی'),
    ('أ', 'ا'),
    ('إ', 'ا'),
    ('ة', 'ه'),
    ('٠', '۰'),
    ('١', '۱'),
    ('٢', '۲'),
    ('٣', '۳'),
    ('٤', '۴'),
    ('٥', '۵'),
    ('٦', '۶'),
    ('٧', '۷'),
    ('٨', '۸'),
    ('٩', '۹'),
];

/// Fixed legal vocabulary; occurrences score double during keyword
/// extraction.
pub const LEGAL_TERMS: &[&str] = &[
    "قانون",
    "آیین‌نامه",
    "دستورالعمل",
    "مصوبه",
    "بخشنامه",
    "ماده",
    "تبصره",
    "بند",
    "فصل",
    "قسمت",
    "بخش",
    "مجلس",
    "شورای",
    "وزیر",
    "رئیس‌جمهور",
    "هیئت‌وزیران",
    "تصویب",
    "ابلاغ",
    "اجرا",
    "لغو",
    "اصلاح",
    "الحاق",
];

const MIN_KEYWORD_LENGTH: usize = 3;

/// Character-level normalization and cleanup for Persian legal text.
/// Pure; the only state is the compiled pattern set.
#[derive(Debug)]
pub struct TextNormalizer {
    word_token: Regex,
    persian_char: Regex,
    word_char: Regex,
    sentence_boundary: Regex,
    punctuation_spacing: Regex,
    paren_spacing: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            word_token: Regex::new(r"[\u{0600}-\u{06FF}\u{200C}\u{200D}]+")
                .context("failed to compile word token regex")?,
            persian_char: Regex::new(r"[\u{0600}-\u{06FF}]")
                .context("failed to compile Persian character regex")?,
            word_char: Regex::new(r"\w").context("failed to compile word character regex")?,
            sentence_boundary: Regex::new(r"[.؟!؛]\s+")
                .context("failed to compile sentence boundary regex")?,
            punctuation_spacing: Regex::new(r"\s*([،؛؟!.])\s*")
                .context("failed to compile punctuation spacing regex")?,
            paren_spacing: Regex::new(r"\s*([()])\s*")
                .context("failed to compile parenthesis spacing regex")?,
        })
    }

    /// Unicode compatibility composition followed by the substitution
    /// table. Idempotent; empty input yields an empty string.
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut normalized: String = text.nfkc().collect();
        for (from, to) in CHAR_SUBSTITUTIONS {
            if normalized.contains(*from) {
                normalized = normalized.replace(*from, &to.to_string());
            }
        }
        normalized
    }

    /// Normalizes, collapses whitespace runs within each line, and enforces
    /// the fixed spacing convention around Persian punctuation (no space
    /// before, one space after) and parentheses (one space on both sides).
    /// Line structure survives so downstream line-anchored patterns keep
    /// working; blank lines are dropped.
    pub fn clean(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let normalized = self.normalize(text);
        let mut lines = Vec::new();

        for line in normalized.lines() {
            let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed.is_empty() {
                continue;
            }

            let spaced = self.punctuation_spacing.replace_all(&collapsed, "$1 ");
            let spaced = self.paren_spacing.replace_all(&spaced, " $1 ");
            let recollapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
            lines.push(recollapsed);
        }

        lines.join("\n")
    }

    /// Scores every Persian word token (2 for legal vocabulary, 1
    /// otherwise, summed over occurrences) and returns the top
    /// `max_keywords` by total score; ties keep first-seen order.
    pub fn extract_keywords(&self, text: &str, max_keywords: usize) -> Vec<String> {
        if text.is_empty() || max_keywords == 0 {
            return Vec::new();
        }

        let cleaned = self.clean(text);
        let mut order = Vec::new();
        let mut scores: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();

        for token in self.word_token.find_iter(&cleaned) {
            let word = token.as_str();
            if word.chars().count() < MIN_KEYWORD_LENGTH {
                continue;
            }
            let weight = if LEGAL_TERMS.contains(&word) { 2 } else { 1 };
            let entry = scores.entry(word.to_string()).or_insert(0);
            if *entry == 0 {
                order.push(word.to_string());
            }
            *entry += weight;
        }

        let mut ranked: Vec<(String, usize)> = order
            .into_iter()
            .map(|word| {
                let score = scores[&word];
                (word, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        ranked
            .into_iter()
            .take(max_keywords)
            .map(|(word, _)| word)
            .collect()
    }

    /// At least 30% of the word characters must sit in the Persian/Arabic
    /// block for text to count as Persian content.
    pub fn is_valid_persian_text(&self, text: &str) -> bool {
        if text.trim().chars().count() < 3 {
            return false;
        }

        let persian_count = self.persian_char.find_iter(text).count();
        let total_count = self.word_char.find_iter(text).count();
        if total_count == 0 {
            return false;
        }

        persian_count as f64 / total_count as f64 >= 0.3
    }

    /// Splits on Persian sentence-final punctuation followed by
    /// whitespace; fragments of ten characters or fewer are dropped.
    pub fn split_sentences(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        self.sentence_boundary
            .split(text.trim())
            .map(str::trim)
            .filter(|sentence| sentence.chars().count() > 10)
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new().expect("patterns compile")
    }

    #[test]
    fn normalize_unifies_arabic_forms_and_digits() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize("كتاب"), "کتاب");
        assert_eq!(normalizer.normalize("علي"), "علی");
        assert_eq!(normalizer.normalize("٣٤"), "۳۴");
        assert_eq!(normalizer.normalize("مكاتبة"), "مکاتبه");
        // Persian letters with their own identity stay untouched.
        assert_eq!(normalizer.normalize("هیئت آیین‌نامه"), "هیئت آیین‌نامه");
    }

    #[test]
    fn normalize_is_idempotent() {
        let normalizer = normalizer();
        let samples = [
            "قانون مقررات انتظامی هيئت علمي (مصوب ٢٢/١٢/١٣٦٤)",
            "ماده ۱ - متن نمونه",
            "",
        ];
        for sample in samples {
            let once = normalizer.normalize(sample);
            assert_eq!(normalizer.normalize(&once), once);
        }
    }

    #[test]
    fn clean_fixes_punctuation_and_whitespace() {
        let normalizer = normalizer();
        assert_eq!(
            normalizer.clean("سلام   ، دنیا"),
            "سلام، دنیا"
        );
        assert_eq!(
            normalizer.clean("قانون(مصوب)جدید"),
            "قانون ( مصوب ) جدید"
        );
        assert_eq!(normalizer.clean("  \n\n  "), "");
    }

    #[test]
    fn clean_preserves_line_structure() {
        let normalizer = normalizer();
        let cleaned = normalizer.clean("ماده ۱ - متن\n\nتبصره - توضیح");
        assert_eq!(cleaned, "ماده ۱ - متن\nتبصره - توضیح");
    }

    #[test]
    fn keywords_prefer_legal_vocabulary() {
        let normalizer = normalizer();
        let keywords = normalizer.extract_keywords("دانشگاه قانون دانشگاه قانون", 2);
        assert_eq!(keywords[0], "قانون");
        assert!(keywords.contains(&"دانشگاه".to_string()));
    }

    #[test]
    fn keywords_skip_short_tokens() {
        let normalizer = normalizer();
        let keywords = normalizer.extract_keywords("با قانون با با", 10);
        assert_eq!(keywords, vec!["قانون".to_string()]);
    }

    #[test]
    fn persian_validity_requires_persian_ratio() {
        let normalizer = normalizer();
        assert!(normalizer.is_valid_persian_text("ماده ۱ - متن نمونه قانونی"));
        assert!(!normalizer.is_valid_persian_text("plain english text only"));
        assert!(!normalizer.is_valid_persian_text("اب"));
    }

    #[test]
    fn sentences_split_on_persian_terminators() {
        let normalizer = normalizer();
        let sentences = normalizer
            .split_sentences("این جمله اول است. این جمله دوم است؟ کوتاه.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("جمله اول"));
        assert!(sentences[1].contains("جمله دوم"));
    }
}
