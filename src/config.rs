use std::path::Path;
use std::time::Duration;

use derive_builder::Builder;
use serde::Deserialize;

use crate::error::ReaderError;

/// Lowest tone sample rate that still leaves room for a bell after the
/// crossfade.
pub const MIN_TONE_SAMPLE_RATE: u32 = 8_000;

/// Upper bound for `tone.max_duration_ms`.
pub const MAX_TONE_DURATION_MS: u64 = 10 * 60 * 1_000;

/// Inclusive range a speech parameter is clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the range. Non-finite input maps to `fallback`.
    ///
    /// Inverted bounds are treated as swapped; a NaN bound is ignored.
    pub fn clamp(&self, value: f32, fallback: f32) -> f32 {
        let value = if value.is_finite() { value } else { fallback };
        let lo = self.min.min(self.max);
        let hi = self.min.max(self.max);
        if lo <= hi {
            value.clamp(lo, hi)
        } else {
            value
        }
    }
}

/// Constants for the synthetic placeholder tone.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub sample_rate: u32,
    /// Estimated speaking time per character of input text.
    pub ms_per_char: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    /// Peak amplitude, as a fraction of full scale.
    pub amplitude: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            ms_per_char: 80,
            min_duration_ms: 2_000,
            max_duration_ms: 30_000,
            amplitude: 0.1,
        }
    }
}

/// Runtime configuration for a [`TextReader`](crate::reader::TextReader).
///
/// Every field has a default, so a JSON file only needs the keys it wants to
/// override:
///
/// ```rust
/// use bataa_reader::config::ReaderConfigBuilder;
///
/// let config = ReaderConfigBuilder::default()
///     .preferred_voice("bataa")
///     .filename_prefix("reader")
///     .build()
///     .unwrap();
/// assert_eq!(config.vendor_marker, "google");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Builder)]
#[serde(default)]
#[builder(default, setter(into), build_fn(validate = "Self::validate"))]
pub struct ReaderConfig {
    /// Voice name token that wins outright when present (case-insensitive).
    pub preferred_voice: String,
    /// Vendor marker looked for in voice names, e.g. `"google"`.
    pub vendor_marker: String,
    /// Tokens identifying the target language family in a language tag.
    pub language_family: Vec<String>,
    /// Language tag used for the utterance when the voice is not in the family.
    pub fallback_lang: String,
    pub rate_range: ParamRange,
    pub pitch_range: ParamRange,
    pub volume_range: ParamRange,
    pub tone: ToneConfig,
    pub filename_prefix: String,
    /// Maximum number of text characters considered for the filename preview.
    pub preview_chars: usize,
    pub preview_fallback: String,
    /// How long a prepared download stays alive before it is released.
    pub release_delay_ms: u64,
    /// Interval at which the host recorder is asked to flush chunks.
    pub recorder_timeslice_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            preferred_voice: "bataa".to_string(),
            vendor_marker: "google".to_string(),
            language_family: vec!["mn".to_string(), "mongolian".to_string()],
            fallback_lang: "mn-MN".to_string(),
            rate_range: ParamRange::new(0.5, 1.5),
            pitch_range: ParamRange::new(0.5, 2.0),
            volume_range: ParamRange::new(0.0, 1.0),
            tone: ToneConfig::default(),
            filename_prefix: "bataa".to_string(),
            preview_chars: 20,
            preview_fallback: "mongolian-speech".to_string(),
            release_delay_ms: 2_000,
            recorder_timeslice_ms: 100,
        }
    }
}

impl ReaderConfig {
    /// Load configuration overrides from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ReaderError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ReaderError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| ReaderError::Config(format!("Failed to parse JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ReaderError> {
        for (name, range) in [
            ("rate_range", self.rate_range),
            ("pitch_range", self.pitch_range),
            ("volume_range", self.volume_range),
        ] {
            if !(range.min <= range.max) {
                return Err(ReaderError::Config(format!(
                    "'{name}' has min {} above max {}",
                    range.min, range.max
                )));
            }
        }
        if self.tone.sample_rate < MIN_TONE_SAMPLE_RATE {
            return Err(ReaderError::Config(format!(
                "'tone.sample_rate' {} is below {MIN_TONE_SAMPLE_RATE} Hz",
                self.tone.sample_rate
            )));
        }
        if self.tone.min_duration_ms == 0
            || self.tone.min_duration_ms > self.tone.max_duration_ms
            || self.tone.max_duration_ms > MAX_TONE_DURATION_MS
        {
            return Err(ReaderError::Config(format!(
                "tone duration bounds {}..{} ms are invalid",
                self.tone.min_duration_ms, self.tone.max_duration_ms
            )));
        }
        Ok(())
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn recorder_timeslice(&self) -> Duration {
        Duration::from_millis(self.recorder_timeslice_ms)
    }
}

impl ReaderConfigBuilder {
    /// Runs the same checks as JSON loading on the fields set so far.
    fn validate(&self) -> Result<(), String> {
        let defaults = ReaderConfig::default();
        let candidate = ReaderConfig {
            rate_range: self.rate_range.unwrap_or(defaults.rate_range),
            pitch_range: self.pitch_range.unwrap_or(defaults.pitch_range),
            volume_range: self.volume_range.unwrap_or(defaults.volume_range),
            tone: self.tone.clone().unwrap_or_else(|| defaults.tone.clone()),
            ..defaults
        };
        candidate.validate().map_err(|e| e.to_string())
    }
}
