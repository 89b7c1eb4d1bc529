use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Pipeline tuning knobs. The thresholds are calibration constants, not
/// invariants; an external JSON file can override any subset of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Chunks below this many characters are flagged as undersized.
    pub min_chunk_size: usize,
    /// Hard ceiling for chunk content, in characters.
    pub max_chunk_size: usize,
    /// Overlap carried between consecutive chunks, in characters.
    pub chunk_overlap: usize,
    /// Estimated characters per word when converting the overlap into a
    /// word count; the computed count never drops below one word.
    pub overlap_chars_per_word: usize,
    /// Minimum cleaned length for a law record to be considered at all.
    pub min_law_length: usize,
    /// Law records scoring below this are dropped by the splitter.
    pub quality_threshold: f64,
    /// Keyword cap per document.
    pub max_keywords: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 200,
            max_chunk_size: 1000,
            chunk_overlap: 100,
            overlap_chars_per_word: 10,
            min_law_length: 50,
            quality_threshold: 0.4,
            max_keywords: 20,
        }
    }
}

impl ProcessingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            bail!("max_chunk_size must be positive");
        }
        if self.chunk_overlap >= self.max_chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than max_chunk_size ({})",
                self.chunk_overlap,
                self.max_chunk_size
            );
        }
        if self.min_chunk_size > self.max_chunk_size {
            bail!(
                "min_chunk_size ({}) must not exceed max_chunk_size ({})",
                self.min_chunk_size,
                self.max_chunk_size
            );
        }
        if self.overlap_chars_per_word == 0 {
            bail!("overlap_chars_per_word must be positive");
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            bail!(
                "quality_threshold ({}) must lie in [0, 1]",
                self.quality_threshold
            );
        }
        Ok(())
    }

    /// Overlap expressed in words. The character-based estimate can round
    /// down to zero for small overlaps; a configured overlap always carries
    /// at least one word.
    pub fn overlap_word_count(&self) -> usize {
        if self.chunk_overlap == 0 {
            return 0;
        }
        (self.chunk_overlap / self.overlap_chars_per_word).max(1)
    }
}
