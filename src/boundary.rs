use anyhow::{Context, Result};
use regex::Regex;

/// Marker families recognized in statute text. The law separator splits
/// the source document into records; the other three drive the recursive
/// structure parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerFamily {
    LawSeparator,
    Chapter,
    Article,
    Note,
}

/// One contiguous span of text owned by a structural marker. Spans of one
/// family partition their input: sorted, non-overlapping, and covering the
/// whole text. A span with an empty label is either a separator segment or
/// the preamble before the first marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub label: String,
    pub title: String,
    pub start: usize,
    pub end: usize,
    /// Offset just past the matched header line; equals `start` for
    /// unlabeled spans.
    pub body_start: usize,
}

impl Boundary {
    pub fn is_preamble(&self) -> bool {
        self.label.is_empty()
    }

    pub fn span<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }

    pub fn body<'t>(&self, text: &'t str) -> &'t str {
        &text[self.body_start..self.end]
    }
}

#[derive(Debug)]
pub struct BoundaryExtractor {
    law_separator: Regex,
    chapter: Regex,
    article: Regex,
    single_article: Regex,
    note: Regex,
}

impl BoundaryExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            law_separator: Regex::new(r"\*{10,}")
                .context("failed to compile law separator regex")?,
            chapter: Regex::new(r"(?m)^(فصل\s+\S+)\s*[-–—]?\s*(.*)$")
                .context("failed to compile chapter header regex")?,
            article: Regex::new(r"(?m)^(ماده\s*[0-9۰-۹]+)\s*[-–—]?\s*(.*)$")
                .context("failed to compile article header regex")?,
            single_article: Regex::new(r"(?m)^(ماده\s*واحده)\s*[-–—]?\s*(.*)$")
                .context("failed to compile single article header regex")?,
            note: Regex::new(r"(?m)^(تبصره\s*[0-9۰-۹]*)\s*[-–—:]?\s*(.*)$")
                .context("failed to compile note header regex")?,
        })
    }

    pub fn find_boundaries(&self, text: &str, family: MarkerFamily) -> Vec<Boundary> {
        if text.is_empty() {
            return Vec::new();
        }

        match family {
            MarkerFamily::LawSeparator => self.separator_segments(text),
            MarkerFamily::Chapter => self.marker_spans(text, &[&self.chapter]),
            MarkerFamily::Article => {
                self.marker_spans(text, &[&self.single_article, &self.article])
            }
            MarkerFamily::Note => self.marker_spans(text, &[&self.note]),
        }
    }

    /// Separator segments cut at each separator match end, so every record
    /// keeps its own leading title line and the separator run trails the
    /// record it closes.
    fn separator_segments(&self, text: &str) -> Vec<Boundary> {
        let mut boundaries = Vec::new();
        let mut start = 0;

        for found in self.law_separator.find_iter(text) {
            if start < found.end() {
                boundaries.push(unlabeled(start, found.end()));
            }
            start = found.end();
        }

        if start < text.len() {
            boundaries.push(unlabeled(start, text.len()));
        }

        boundaries
    }

    /// One span per header match, from the match start to the next match
    /// start. Patterns earlier in `patterns` win when two match at the
    /// same offset (the single-article form shadows the numbered one).
    fn marker_spans(&self, text: &str, patterns: &[&Regex]) -> Vec<Boundary> {
        struct Header {
            start: usize,
            body_start: usize,
            rank: usize,
            label: String,
            title: String,
        }

        let mut headers = Vec::new();
        for (rank, pattern) in patterns.iter().enumerate() {
            for captures in pattern.captures_iter(text) {
                let whole = captures.get(0).expect("match has a full capture");
                headers.push(Header {
                    start: whole.start(),
                    body_start: whole.end(),
                    rank,
                    label: captures
                        .get(1)
                        .map(|group| group.as_str().trim().to_string())
                        .unwrap_or_default(),
                    title: captures
                        .get(2)
                        .map(|group| group.as_str().trim().to_string())
                        .unwrap_or_default(),
                });
            }
        }

        headers.sort_by(|a, b| a.start.cmp(&b.start).then(a.rank.cmp(&b.rank)));
        headers.dedup_by(|next, kept| next.start == kept.start);

        let mut boundaries = Vec::new();
        let first_start = headers.first().map_or(text.len(), |header| header.start);
        if first_start > 0 {
            boundaries.push(unlabeled(0, first_start));
        }

        for index in 0..headers.len() {
            let end = headers
                .get(index + 1)
                .map_or(text.len(), |next| next.start);
            let header = &headers[index];
            boundaries.push(Boundary {
                label: header.label.clone(),
                title: header.title.clone(),
                start: header.start,
                end,
                body_start: header.body_start.min(end),
            });
        }

        boundaries
    }
}

fn unlabeled(start: usize, end: usize) -> Boundary {
    Boundary {
        label: String::new(),
        title: String::new(),
        start,
        end,
        body_start: start,
    }
}
